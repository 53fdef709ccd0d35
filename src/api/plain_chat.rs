use std::sync::Arc;

use axum::response::Response;

use super::common::{error_response, streaming_response, CompletionCall};
use crate::observability::StreamStats;
use crate::protocol::{plain_chat_conversation, PlainChatRequest};
use crate::state::AppState;
use crate::stream::{relay_stream, OutputEncoding};

/// Plain chat: fixed assistant system prompt, prior turns and the new
/// message, answered as a raw incremental text body.
pub async fn handler(state: Arc<AppState>, body: bytes::Bytes) -> Response {
    let request_id = state.next_request_id();

    let request = match PlainChatRequest::from_json_bytes(&body) {
        Ok(request) => request,
        Err(err) => return error_response(&request_id, &err),
    };
    if let Err(err) = state.upstream.headers(true) {
        return error_response(&request_id, &err);
    }

    let messages = plain_chat_conversation(
        &state.config.features.assistant_system_prompt,
        request.history,
        request.message,
    );
    let model = state.config.upstream.chat_model.as_str();
    let call = CompletionCall {
        state: &state,
        request_id: &request_id,
        model,
        messages: &messages,
    };

    match call.open_stream().await {
        Ok(response) => streaming_response(
            relay_stream(
                response.bytes_stream(),
                OutputEncoding::PlainText,
                StreamStats::new(request_id.clone(), model),
            ),
            OutputEncoding::PlainText,
        ),
        Err(err) => error_response(&request_id, &err),
    }
}
