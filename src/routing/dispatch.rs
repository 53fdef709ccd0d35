use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::presets::PresetKind;
use crate::api::{chat, health, plain_chat, presets};
use crate::error::{into_axum_response, GatewayError};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMatch {
    Health,
    ReasoningChat,
    ReasoningPreflight,
    PlainChat,
    Preset(PresetKind),
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching route handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(
        &parts.method,
        parts.uri.path(),
        &state.config.server.base_path,
    );

    let response = match route {
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::ReasoningPreflight => chat::preflight_handler(parts.uri.query()),
        RouteMatch::ReasoningChat => {
            let body_bytes = match read_request_body(body, body_limit(&state)).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            chat::handler(state, body_bytes).await
        }
        RouteMatch::PlainChat => {
            let body_bytes = match read_request_body(body, body_limit(&state)).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            plain_chat::handler(state, body_bytes).await
        }
        RouteMatch::Preset(kind) => {
            let body_bytes = match read_request_body(body, body_limit(&state)).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            presets::handler(state, kind, body_bytes).await
        }
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    Ok(response)
}

#[inline]
fn body_limit(state: &AppState) -> usize {
    state.config.server.max_request_body_bytes
}

async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, limit).await.map_err(|err| {
        let over_limit = std::error::Error::source(&err)
            .is_some_and(|source| source.is::<http_body_util::LengthLimitError>());
        if over_limit {
            let mut response = into_axum_response(&GatewayError::Validation(format!(
                "request body too large (max {limit} bytes)"
            )));
            *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
            response
        } else {
            into_axum_response(&GatewayError::Validation(format!(
                "failed to read request body: {err}"
            )))
        }
    })
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/api/deepseek" => match *method {
            Method::POST => RouteMatch::ReasoningChat,
            Method::GET => RouteMatch::ReasoningPreflight,
            _ => RouteMatch::MethodNotAllowed,
        },
        "/api/chat" => {
            if method == Method::POST {
                RouteMatch::PlainChat
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => {
            let Some(task) = path.strip_prefix("/api/assistant/") else {
                return RouteMatch::NotFound;
            };
            let kind = match task {
                "study-plan" => PresetKind::StudyPlan,
                "homework-help" => PresetKind::HomeworkHelp,
                "explain" => PresetKind::ConceptExplanation,
                _ => return RouteMatch::NotFound,
            };
            if method == Method::POST {
                RouteMatch::Preset(kind)
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}
