use crate::error::GatewayError;
use crate::protocol::{decode_completion, Completion, Message, UpstreamRequest};
use crate::state::AppState;
use crate::util::floor_char_boundary;

const UPSTREAM_ERROR_PREVIEW_MAX: usize = 500;

/// One outbound chat-completion call.
#[derive(Clone, Copy)]
pub(crate) struct CompletionCall<'a> {
    pub(crate) state: &'a AppState,
    pub(crate) request_id: &'a str,
    pub(crate) model: &'a str,
    pub(crate) messages: &'a [Message],
}

impl CompletionCall<'_> {
    fn body(&self, stream: bool) -> Result<bytes::Bytes, GatewayError> {
        let upstream = &self.state.config.upstream;
        UpstreamRequest {
            model: self.model,
            messages: self.messages,
            temperature: upstream.temperature,
            max_tokens: upstream.max_tokens,
            stream,
        }
        .to_body()
    }

    async fn send(&self, stream: bool) -> Result<reqwest::Response, GatewayError> {
        let headers = self.state.upstream.headers(stream)?;
        let body = self.body(stream)?;
        tracing::debug!(
            request_id = self.request_id,
            model = self.model,
            messages = self.messages.len(),
            stream,
            "sending upstream request"
        );
        let response = self
            .state
            .transport
            .post(self.state.upstream.chat_url_parsed(), headers, body)
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body_bytes = response.bytes().await.unwrap_or_default();
        let message = sanitize_upstream_error(&body_bytes);
        tracing::warn!(
            request_id = self.request_id,
            status = status.as_u16(),
            error = %message,
            "upstream returned error status"
        );
        Err(GatewayError::Upstream {
            status: status.as_u16(),
            message,
        })
    }

    /// Non-streaming call: send once and decode the buffered body.
    pub(crate) async fn complete(&self) -> Result<Completion, GatewayError> {
        let response = self.send(false).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to read response body: {e}")))?;
        decode_completion(&body)
    }

    /// Streaming call: the returned response has a success status and an
    /// unread body.
    pub(crate) async fn open_stream(&self) -> Result<reqwest::Response, GatewayError> {
        self.send(true).await
    }
}

/// Extract a short human-readable message from a provider error body.
pub(crate) fn sanitize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let error = json.get("error");
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .or_else(|| error.and_then(|e| e.as_str()));
        if let Some(msg) = message {
            return truncate(msg);
        }
    }

    truncate(&String::from_utf8_lossy(body))
}

fn truncate(text: &str) -> String {
    if text.len() > UPSTREAM_ERROR_PREVIEW_MAX {
        let end = floor_char_boundary(text, UPSTREAM_ERROR_PREVIEW_MAX);
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}
