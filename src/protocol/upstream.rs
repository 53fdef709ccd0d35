use serde::{Deserialize, Serialize};

use super::chat::Message;
use crate::error::GatewayError;

/// Literal payload of the end-of-stream sentinel frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Body sent to the completion provider.
#[derive(Debug, Serialize)]
pub struct UpstreamRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl UpstreamRequest<'_> {
    /// Serialize the request body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if serialization fails.
    pub fn to_body(&self) -> Result<bytes::Bytes, GatewayError> {
        serde_json::to_vec(self)
            .map(bytes::Bytes::from)
            .map_err(|err| GatewayError::Internal(format!("failed to encode upstream body: {err}")))
    }
}

/// Token usage reported by the provider on non-streaming calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Decoded non-streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
    pub usage: Option<Usage>,
}

/// Reply text used when a completion carries no usable content.
pub const NO_REPLY_FALLBACK: &str = "Unable to get a reply";

impl Completion {
    /// The message content, or [`NO_REPLY_FALLBACK`] when it is missing or empty.
    #[must_use]
    pub fn reply_text(&self) -> &str {
        self.content
            .as_deref()
            .filter(|content| !content.is_empty())
            .unwrap_or(NO_REPLY_FALLBACK)
    }
}

#[derive(Deserialize)]
struct CompletionWire {
    #[serde(default)]
    choices: Vec<CompletionChoiceWire>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct CompletionChoiceWire {
    #[serde(default)]
    message: Option<ContentWire>,
}

#[derive(Deserialize)]
struct ContentWire {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a full (non-streaming) completion body.
///
/// # Errors
///
/// Returns [`GatewayError::Upstream`] with status 502 when the provider
/// answered 2xx with a body that is not a completion object.
pub fn decode_completion(body: &[u8]) -> Result<Completion, GatewayError> {
    let wire: CompletionWire =
        serde_json::from_slice(body).map_err(|err| GatewayError::Upstream {
            status: 502,
            message: format!("invalid completion body: {err}"),
        })?;
    let content = wire
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content);
    Ok(Completion {
        content,
        usage: wire.usage,
    })
}

/// Closed set of events a streaming frame payload can decode to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A non-empty piece of generated text.
    Delta(String),
    /// A well-formed chunk that carries no text (role header, finish reason,
    /// provider-side reasoning field).
    NoContent,
    /// The provider reported an error inside the stream.
    Error(String),
    /// End-of-stream sentinel.
    Done,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayloadWire {
    Chunk { choices: Vec<ChunkChoiceWire> },
    Failure { error: ErrorDetailWire },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetailWire {
    Object { message: String },
    Text(String),
    Other(serde_json::Value),
}

#[derive(Deserialize)]
struct ChunkChoiceWire {
    #[serde(default)]
    delta: Option<ContentWire>,
}

/// Decode the payload of one `data:` frame from the provider.
///
/// # Errors
///
/// Returns [`GatewayError::Decode`] when the payload is neither the sentinel
/// nor one of the known JSON shapes.
pub fn decode_stream_payload(payload: &str) -> Result<UpstreamEvent, GatewayError> {
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(UpstreamEvent::Done);
    }
    let wire: StreamPayloadWire =
        serde_json::from_str(payload).map_err(|err| GatewayError::Decode(err.to_string()))?;
    Ok(match wire {
        StreamPayloadWire::Failure { error } => UpstreamEvent::Error(match error {
            ErrorDetailWire::Object { message } | ErrorDetailWire::Text(message) => message,
            ErrorDetailWire::Other(value) => value.to_string(),
        }),
        StreamPayloadWire::Chunk { choices } => choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map_or(UpstreamEvent::NoContent, UpstreamEvent::Delta),
    })
}

/// JSON body of a successful non-streaming reply: `{"response": text}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
    pub response: String,
}

/// Records a client reads back from the relayed event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Content(String),
    Error(String),
    Done,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RelayPayloadWire {
    Content { content: String },
    Error { error: String },
}

/// Decode the payload of one relayed `data:` record.
///
/// # Errors
///
/// Returns [`GatewayError::Decode`] for payloads outside the relay contract.
pub fn decode_relay_payload(payload: &str) -> Result<RelayEvent, GatewayError> {
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(RelayEvent::Done);
    }
    let wire: RelayPayloadWire =
        serde_json::from_str(payload).map_err(|err| GatewayError::Decode(err.to_string()))?;
    Ok(match wire {
        RelayPayloadWire::Content { content } => RelayEvent::Content(content),
        RelayPayloadWire::Error { error } => RelayEvent::Error(error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::chat::Message;

    #[test]
    fn reply_text_falls_back_when_content_is_missing_or_empty() {
        let missing = decode_completion(br#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(missing.reply_text(), NO_REPLY_FALLBACK);
        let empty = decode_completion(br#"{"choices":[{"message":{"content":""}}]}"#).unwrap();
        assert_eq!(empty.reply_text(), NO_REPLY_FALLBACK);
        let no_choices = decode_completion(br#"{"choices":[]}"#).unwrap();
        assert_eq!(no_choices.reply_text(), NO_REPLY_FALLBACK);
        let present = decode_completion(br#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(present.reply_text(), "hi");
    }

    #[test]
    fn upstream_request_wire_shape() {
        let messages = vec![Message::user("hi")];
        let request = UpstreamRequest {
            model: "deepseek-reasoner",
            messages: &messages,
            temperature: 0.7,
            max_tokens: 2000,
            stream: true,
        };
        let body: serde_json::Value = serde_json::from_slice(&request.to_body().unwrap()).unwrap();
        assert_eq!(body["model"], "deepseek-reasoner");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["stream"], true);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn decodes_completion_content_and_usage() {
        let body = br#"{"choices":[{"message":{"content":"<think>x</think>Hello"}}],
            "usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#;
        let completion = decode_completion(body).unwrap();
        assert_eq!(completion.content.as_deref(), Some("<think>x</think>Hello"));
        assert_eq!(completion.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn completion_without_choices_has_no_content() {
        let completion = decode_completion(br#"{"choices":[]}"#).unwrap();
        assert!(completion.content.is_none());
        assert!(completion.usage.is_none());
    }

    #[test]
    fn invalid_completion_body_is_bad_gateway() {
        let err = decode_completion(b"<html>").unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: 502, .. }));
    }

    #[test]
    fn decodes_content_delta() {
        let event =
            decode_stream_payload(r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#).unwrap();
        assert_eq!(event, UpstreamEvent::Delta("Hi".to_string()));
    }

    #[test]
    fn role_only_and_finish_chunks_have_no_content() {
        let role = decode_stream_payload(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#);
        let finish = decode_stream_payload(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        let empty = decode_stream_payload(r#"{"choices":[{"delta":{"content":""}}]}"#);
        let reasoning = decode_stream_payload(
            r#"{"choices":[{"delta":{"content":null,"reasoning_content":"hmm"}}]}"#,
        );
        assert_eq!(role.unwrap(), UpstreamEvent::NoContent);
        assert_eq!(finish.unwrap(), UpstreamEvent::NoContent);
        assert_eq!(empty.unwrap(), UpstreamEvent::NoContent);
        assert_eq!(reasoning.unwrap(), UpstreamEvent::NoContent);
    }

    #[test]
    fn decodes_error_shapes() {
        let object = decode_stream_payload(r#"{"error":{"message":"overloaded","type":"x"}}"#);
        let text = decode_stream_payload(r#"{"error":"quota"}"#);
        let other = decode_stream_payload(r#"{"error":{"code":9}}"#);
        assert_eq!(object.unwrap(), UpstreamEvent::Error("overloaded".to_string()));
        assert_eq!(text.unwrap(), UpstreamEvent::Error("quota".to_string()));
        assert_eq!(other.unwrap(), UpstreamEvent::Error(r#"{"code":9}"#.to_string()));
    }

    #[test]
    fn decodes_sentinel() {
        assert_eq!(decode_stream_payload("[DONE]").unwrap(), UpstreamEvent::Done);
        assert_eq!(decode_stream_payload(" [DONE] ").unwrap(), UpstreamEvent::Done);
    }

    #[test]
    fn unknown_shapes_are_decode_errors() {
        assert!(matches!(
            decode_stream_payload("{not json"),
            Err(GatewayError::Decode(_))
        ));
        assert!(matches!(
            decode_stream_payload(r#"{"foo":1}"#),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn decodes_relay_records() {
        assert_eq!(
            decode_relay_payload(r#"{"content":"a\nb"}"#).unwrap(),
            RelayEvent::Content("a\nb".to_string())
        );
        assert_eq!(
            decode_relay_payload(r#"{"error":"stream failed"}"#).unwrap(),
            RelayEvent::Error("stream failed".to_string())
        );
        assert_eq!(decode_relay_payload("[DONE]").unwrap(), RelayEvent::Done);
        assert!(decode_relay_payload("[]").is_err());
    }
}
