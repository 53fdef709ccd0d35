//! Local stand-in for the completion provider.
//!
//! Serves `POST /v1/chat/completions` and answers according to
//! `MOCK_SCENARIO`; the request's `stream` flag picks between a JSON body and
//! an event stream. `GET /_mock/stats` reports request counters.

use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_001;

#[derive(Copy, Clone)]
enum MockScenario {
    /// Plain answer, no reasoning segment.
    Text,
    /// Reasoning segment followed by the answer.
    Reasoning,
    /// Markers split across deltas.
    SplitMarkers,
    /// One frame that is not JSON in the middle of the stream.
    Malformed,
    /// Stream ends without the completion sentinel.
    Truncated,
    /// Every request fails with 503.
    Error,
}

impl MockScenario {
    fn name(self) -> &'static str {
        match self {
            MockScenario::Text => "text",
            MockScenario::Reasoning => "reasoning",
            MockScenario::SplitMarkers => "split",
            MockScenario::Malformed => "malformed",
            MockScenario::Truncated => "truncated",
            MockScenario::Error => "error",
        }
    }

    fn deltas(self) -> &'static [&'static str] {
        match self {
            MockScenario::Text | MockScenario::Malformed | MockScenario::Truncated => {
                &["Practice ", "a little ", "every day."]
            }
            MockScenario::Reasoning => &[
                "<think>",
                "The student wants a study tip.",
                "</think>",
                "\n\nPractice a little every day.",
            ],
            MockScenario::SplitMarkers => &[
                "<th",
                "ink>short plan</th",
                "ink>\n\nPractice ",
                "a little every day.",
            ],
            MockScenario::Error => &[],
        }
    }
}

#[derive(Default)]
struct RequestStats {
    total: AtomicU64,
    streaming: AtomicU64,
}

struct MockState {
    scenario: MockScenario,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        stats: RequestStats::default(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!(
        "mock upstream on http://127.0.0.1:{port}/v1 (scenario: {})",
        state.scenario.name()
    );

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("reasoning") => MockScenario::Reasoning,
        Ok("split") => MockScenario::SplitMarkers,
        Ok("malformed") => MockScenario::Malformed,
        Ok("truncated") => MockScenario::Truncated,
        Ok("error") => MockScenario::Error,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &MockState) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };
    let path = parts.uri.path();

    if parts.method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if parts.method != Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            r#"{"error":{"message":"method not allowed"}}"#.to_string(),
        );
    }
    if !matches!(path, "/v1/chat/completions" | "/chat/completions") {
        return json_response(
            StatusCode::NOT_FOUND,
            r#"{"error":{"message":"not found"}}"#.to_string(),
        );
    }

    let wants_stream = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("stream")?.as_bool())
        .unwrap_or(false);
    state.stats.total.fetch_add(1, Ordering::Relaxed);
    if wants_stream {
        state.stats.streaming.fetch_add(1, Ordering::Relaxed);
    }

    if matches!(state.scenario, MockScenario::Error) {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error":{"message":"mock injected error","type":"service_unavailable"}}"#
                .to_string(),
        );
    }

    if wants_stream {
        streaming_response(state.scenario)
    } else {
        non_streaming_response(state.scenario)
    }
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "scenario": state.scenario.name(),
        "requests": state.stats.total.load(Ordering::Relaxed),
        "streaming_requests": state.stats.streaming.load(Ordering::Relaxed),
    });
    json_response(StatusCode::OK, body.to_string())
}

fn non_streaming_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1,
        "model": "deepseek-reasoner",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": scenario.deltas().concat() },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 24, "completion_tokens": 12, "total_tokens": 36 }
    });
    json_response(StatusCode::OK, body.to_string())
}

fn chunk_frame(delta: &str) -> String {
    let chunk = serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 1,
        "model": "deepseek-reasoner",
        "choices": [{ "index": 0, "delta": { "content": delta }, "finish_reason": null }]
    });
    format!("data: {chunk}\n\n")
}

fn streaming_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    let mut body = String::from(
        "data: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-reasoner\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
    );
    for (idx, delta) in scenario.deltas().iter().enumerate() {
        if idx == 1 && matches!(scenario, MockScenario::Malformed) {
            body.push_str("data: {\"choices\": [\n\n");
        }
        body.push_str(&chunk_frame(delta));
    }
    if !matches!(scenario, MockScenario::Truncated) {
        body.push_str("data: [DONE]\n\n");
    }

    let mut response = Response::new(Full::new(Bytes::from(body)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
