use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::Response;

use super::common::{
    error_response, ok_json_response, streaming_response, streaming_response_from_body,
    CompletionCall,
};
use crate::error::GatewayError;
use crate::observability::{log_request_complete, StreamStats};
use crate::protocol::{enhance_conversation, ConversationRequest, ReplyBody};
use crate::state::AppState;
use crate::stream::{relay_stream, strip_reasoning, OutputEncoding};

/// Reasoning proxy: validate, enhance the system prompt, call the reasoning
/// model and hide its `<think>` segment from the reply.
pub async fn handler(state: Arc<AppState>, body: bytes::Bytes) -> Response {
    let started = Instant::now();
    let request_id = state.next_request_id();

    let request = match ConversationRequest::from_json_bytes(&body) {
        Ok(request) => request,
        Err(err) => return error_response(&request_id, &err),
    };
    if let Err(err) = state.upstream.headers(request.stream) {
        return error_response(&request_id, &err);
    }

    let messages = enhance_conversation(
        request.messages,
        state.config.features.reasoning_template(),
    );
    let model = state.config.upstream.reasoning_model.as_str();
    let call = CompletionCall {
        state: &state,
        request_id: &request_id,
        model,
        messages: &messages,
    };

    if request.stream {
        return match call.open_stream().await {
            Ok(response) => streaming_response(
                relay_stream(
                    response.bytes_stream(),
                    OutputEncoding::EventStream,
                    StreamStats::new(request_id.clone(), model),
                ),
                OutputEncoding::EventStream,
            ),
            Err(err) => error_response(&request_id, &err),
        };
    }

    let completion = match call.complete().await {
        Ok(completion) => completion,
        Err(err) => return error_response(&request_id, &err),
    };
    log_request_complete(&request_id, model, completion.usage.as_ref(), started);
    ok_json_response(&ReplyBody {
        response: strip_reasoning(completion.reply_text()),
    })
}

/// `GET` on the proxy path: an empty event stream for `EventSource`
/// clients that open the connection before posting.
pub fn preflight_handler(query: Option<&str>) -> Response {
    let wants_stream = query.is_some_and(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .any(|(key, value)| key == "stream" && value == "true")
    });
    if wants_stream {
        streaming_response_from_body(Body::empty(), OutputEncoding::EventStream)
    } else {
        error_response(
            "preflight",
            &GatewayError::Validation("invalid request parameters: expected stream=true".into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_requires_stream_true() {
        assert_eq!(preflight_handler(Some("stream=true")).status(), http::StatusCode::OK);
        assert_eq!(
            preflight_handler(Some("a=1&stream=true")).headers()[http::header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(
            preflight_handler(Some("stream=false")).status(),
            http::StatusCode::BAD_REQUEST
        );
        assert_eq!(preflight_handler(None).status(), http::StatusCode::BAD_REQUEST);
    }
}
