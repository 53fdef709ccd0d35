use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Inbound body of the reasoning proxy route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRequest {
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl ConversationRequest {
    /// Parse and validate `{ "messages": [...], "stream": bool? }`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] describing the first violated rule.
    pub fn from_json_bytes(body: &[u8]) -> Result<Self, GatewayError> {
        let value = parse_json_object(body)?;
        let messages = parse_messages(value.get("messages"))?;
        if messages.is_empty() {
            return Err(invalid("messages must contain at least one message"));
        }
        let stream = parse_optional_bool(value.get("stream"), "stream")?;
        Ok(Self { messages, stream })
    }
}

/// Inbound body of the plain chat route: one new user message plus prior turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainChatRequest {
    pub message: String,
    pub history: Vec<Message>,
}

impl PlainChatRequest {
    /// Parse and validate `{ "message": string, "history": [...]? }`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] when `message` is not a string or
    /// `history` is not a valid message array.
    pub fn from_json_bytes(body: &[u8]) -> Result<Self, GatewayError> {
        let value = parse_json_object(body)?;
        let message = match value.get("message") {
            Some(Value::String(text)) => text.clone(),
            Some(_) => return Err(invalid("message must be a string")),
            None => return Err(invalid("missing message field")),
        };
        let history = match value.get("history") {
            None | Some(Value::Null) => Vec::new(),
            other => parse_messages(other)?,
        };
        Ok(Self { message, history })
    }
}

fn invalid(message: impl Into<String>) -> GatewayError {
    GatewayError::Validation(message.into())
}

fn parse_json_object(body: &[u8]) -> Result<Map<String, Value>, GatewayError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(invalid("request body must be a JSON object")),
        Err(err) => Err(invalid(format!("request body is not valid JSON: {err}"))),
    }
}

fn parse_optional_bool(value: Option<&Value>, field: &str) -> Result<bool, GatewayError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(invalid(format!("{field} must be a boolean"))),
    }
}

fn parse_messages(value: Option<&Value>) -> Result<Vec<Message>, GatewayError> {
    let Some(Value::Array(items)) = value else {
        return Err(invalid(
            "invalid request: messages field is missing or is not an array",
        ));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_message(index, item))
        .collect()
}

fn parse_message(index: usize, value: &Value) -> Result<Message, GatewayError> {
    let Value::Object(fields) = value else {
        return Err(invalid(format!("messages[{index}] must be an object")));
    };
    let role = match fields.get("role") {
        Some(Value::String(raw)) => Role::parse(raw).ok_or_else(|| {
            invalid(format!(
                "messages[{index}].role must be one of system, user, assistant (got '{raw}')"
            ))
        })?,
        Some(_) => return Err(invalid(format!("messages[{index}].role must be a string"))),
        None => return Err(invalid(format!("messages[{index}].role is missing"))),
    };
    let content = match fields.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => {
            return Err(invalid(format!("messages[{index}].content is missing")))
        }
        Some(_) => {
            return Err(invalid(format!(
                "messages[{index}].content must be a string"
            )))
        }
    };
    Ok(Message { role, content })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_message(result: Result<ConversationRequest, GatewayError>) -> String {
        match result {
            Err(GatewayError::Validation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn parses_messages_and_defaults_stream_to_false() {
        let body = br#"{"messages":[{"role":"user","content":"hi"}]}"#;
        let request = ConversationRequest::from_json_bytes(body).unwrap();
        assert_eq!(request.messages, vec![Message::user("hi")]);
        assert!(!request.stream);
    }

    #[test]
    fn parses_stream_flag() {
        let body = br#"{"messages":[{"role":"assistant","content":"a"}],"stream":true}"#;
        assert!(ConversationRequest::from_json_bytes(body).unwrap().stream);
    }

    #[test]
    fn rejects_messages_that_are_not_an_array() {
        let message =
            validation_message(ConversationRequest::from_json_bytes(br#"{"messages":"not-an-array"}"#));
        assert!(message.contains("not an array"));
    }

    #[test]
    fn rejects_missing_messages() {
        let message = validation_message(ConversationRequest::from_json_bytes(b"{}"));
        assert!(message.contains("messages"));
    }

    #[test]
    fn rejects_empty_messages() {
        let message =
            validation_message(ConversationRequest::from_json_bytes(br#"{"messages":[]}"#));
        assert!(message.contains("at least one"));
    }

    #[test]
    fn rejects_unknown_role() {
        let body = br#"{"messages":[{"role":"tool","content":"x"}]}"#;
        let message = validation_message(ConversationRequest::from_json_bytes(body));
        assert!(message.contains("messages[0].role"));
        assert!(message.contains("tool"));
    }

    #[test]
    fn rejects_null_content() {
        let body = br#"{"messages":[{"role":"user","content":"ok"},{"role":"user","content":null}]}"#;
        let message = validation_message(ConversationRequest::from_json_bytes(body));
        assert!(message.contains("messages[1].content"));
    }

    #[test]
    fn rejects_non_string_content() {
        let body = br#"{"messages":[{"role":"user","content":42}]}"#;
        let message = validation_message(ConversationRequest::from_json_bytes(body));
        assert!(message.contains("must be a string"));
    }

    #[test]
    fn rejects_non_boolean_stream() {
        let body = br#"{"messages":[{"role":"user","content":"x"}],"stream":"yes"}"#;
        let message = validation_message(ConversationRequest::from_json_bytes(body));
        assert_eq!(message, "stream must be a boolean");
    }

    #[test]
    fn rejects_non_json_body() {
        let message = validation_message(ConversationRequest::from_json_bytes(b"not json"));
        assert!(message.starts_with("request body is not valid JSON"));
    }

    #[test]
    fn plain_chat_request_accepts_missing_history() {
        let request = PlainChatRequest::from_json_bytes(br#"{"message":"hello"}"#).unwrap();
        assert_eq!(request.message, "hello");
        assert!(request.history.is_empty());
    }

    #[test]
    fn plain_chat_request_validates_history() {
        let body = br#"{"message":"hello","history":[{"role":"bot","content":"x"}]}"#;
        assert!(matches!(
            PlainChatRequest::from_json_bytes(body),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn plain_chat_request_requires_string_message() {
        assert!(matches!(
            PlainChatRequest::from_json_bytes(br#"{"message":5}"#),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn message_serializes_with_lowercase_role() {
        let json = serde_json::to_string(&Message::system("s")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"s"}"#);
    }
}
