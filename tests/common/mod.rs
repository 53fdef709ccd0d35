#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assistant_gateway::config::AppConfig;
use assistant_gateway::routing::dispatch::dispatch_request;
use assistant_gateway::state::AppState;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

/// What the mock provider answers to one completion request.
pub enum MockReply {
    Json(Value),
    /// Event-stream body delivered as the given chunks.
    Stream(Vec<String>),
    Status(u16, Value),
    /// One event-stream chunk, then keep-alive comments until the client
    /// goes away; `released` is set once the body is dropped.
    Endless {
        first: String,
        released: Arc<AtomicBool>,
    },
}

/// Sets its flag when dropped together with the body that owns it.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    server: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Value {
        self.bodies
            .lock()
            .expect("bodies lock")
            .last()
            .cloned()
            .expect("at least one upstream call")
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Mock provider serving `/v1/chat/completions`, answering with `reply`.
pub async fn spawn_upstream<F>(reply: F) -> MockUpstream
where
    F: Fn(&Value) -> MockReply + Send + Sync + 'static,
{
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(reply);

    let app = {
        let hits = hits.clone();
        let bodies = bodies.clone();
        Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let hits = hits.clone();
                let bodies = bodies.clone();
                let reply = reply.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let answer = reply(&body);
                    bodies.lock().expect("bodies lock").push(body);
                    render_reply(answer)
                }
            }),
        )
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream {
        addr,
        hits,
        bodies,
        server,
    }
}

fn render_reply(reply: MockReply) -> Response {
    match reply {
        MockReply::Json(value) => Json(value).into_response(),
        MockReply::Stream(chunks) => {
            let body = Body::from_stream(futures_util::stream::iter(
                chunks.into_iter().map(Ok::<_, std::io::Error>),
            ));
            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(body)
                .expect("mock stream response")
        }
        MockReply::Endless { first, released } => {
            let chunks = futures_util::stream::unfold(
                (Some(first), DropFlag(released)),
                |(first, flag)| async move {
                    let chunk = match first {
                        Some(first) => first,
                        None => {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            ": keep-alive\n\n".to_string()
                        }
                    };
                    Some((Ok::<_, std::io::Error>(chunk), (None, flag)))
                },
            );
            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(chunks))
                .expect("mock stream response")
        }
        MockReply::Status(status, value) => (
            StatusCode::from_u16(status).expect("mock status"),
            Json(value),
        )
            .into_response(),
    }
}

/// `{"choices":[{"message":{"content": text}}]}`
pub fn completion(text: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16 }
    })
}

/// One provider `data:` frame carrying a content delta.
pub fn delta_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({ "choices": [{ "index": 0, "delta": { "content": text } }] })
    )
}

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

pub fn config_for(upstream: &MockUpstream) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.base_url = upstream.base_url();
    config.upstream.api_key = Some("sk-test".to_string());
    config
}

pub fn build_state(config: AppConfig) -> Arc<AppState> {
    Arc::new(AppState::from_config(config).expect("state from config"))
}

pub async fn send(state: Arc<AppState>, method: &str, uri: &str, body: Body) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("build request");
    dispatch_request(state, request).await.expect("dispatch")
}

pub async fn post_json(state: Arc<AppState>, uri: &str, body: Value) -> Response {
    let bytes = serde_json::to_vec(&body).expect("serialize request");
    send(state, "POST", uri, Body::from(bytes)).await
}

pub async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

/// Serve the gateway on an ephemeral port; returns its base URL.
pub async fn serve_gateway(state: Arc<AppState>) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().fallback(move |request: Request| {
        let state = state.clone();
        async move {
            match dispatch_request(state, request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        }
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway");
    let addr = listener.local_addr().expect("gateway addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}
