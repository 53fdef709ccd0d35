use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use serde_json::{Map, Value};

use super::common::{error_response, ok_json_response, CompletionCall};
use crate::error::GatewayError;
use crate::observability::log_request_complete;
use crate::protocol::{ReplyBody, TaskPreset};
use crate::state::AppState;
use crate::stream::strip_reasoning;

/// Which canned task a route serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetKind {
    StudyPlan,
    HomeworkHelp,
    ConceptExplanation,
}

fn required_string(fields: &Map<String, Value>, name: &str) -> Result<String, GatewayError> {
    match fields.get(name) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(Value::String(_)) => Err(GatewayError::Validation(format!("{name} cannot be empty"))),
        Some(_) => Err(GatewayError::Validation(format!("{name} must be a string"))),
        None => Err(GatewayError::Validation(format!("missing {name} field"))),
    }
}

impl PresetKind {
    /// Parse the route body into a preset.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] for a non-object body or a
    /// missing, empty or non-string field.
    pub fn parse(self, body: &[u8]) -> Result<TaskPreset, GatewayError> {
        let fields = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => {
                return Err(GatewayError::Validation(
                    "request body must be a JSON object".into(),
                ))
            }
            Err(err) => {
                return Err(GatewayError::Validation(format!(
                    "request body is not valid JSON: {err}"
                )))
            }
        };
        Ok(match self {
            PresetKind::StudyPlan => TaskPreset::StudyPlan {
                subject: required_string(&fields, "subject")?,
                level: required_string(&fields, "level")?,
            },
            PresetKind::HomeworkHelp => TaskPreset::HomeworkHelp {
                question: required_string(&fields, "question")?,
            },
            PresetKind::ConceptExplanation => TaskPreset::ConceptExplanation {
                concept: required_string(&fields, "concept")?,
            },
        })
    }
}

/// Single-turn assistant task answered as `{"response": text}`.
pub async fn handler(state: Arc<AppState>, kind: PresetKind, body: bytes::Bytes) -> Response {
    let started = Instant::now();
    let request_id = state.next_request_id();

    let preset = match kind.parse(&body) {
        Ok(preset) => preset,
        Err(err) => return error_response(&request_id, &err),
    };
    if let Err(err) = state.upstream.headers(false) {
        return error_response(&request_id, &err);
    }

    let messages = preset.messages();
    let model = state.config.upstream.chat_model.as_str();
    let call = CompletionCall {
        state: &state,
        request_id: &request_id,
        model,
        messages: &messages,
    };
    tracing::debug!(request_id = %request_id, preset = preset.name(), "running task preset");

    match call.complete().await {
        Ok(completion) => {
            log_request_complete(&request_id, model, completion.usage.as_ref(), started);
            ok_json_response(&ReplyBody {
                response: strip_reasoning(completion.reply_text()),
            })
        }
        Err(err) => error_response(&request_id, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_preset() {
        let plan = PresetKind::StudyPlan
            .parse(br#"{"subject":"calculus","level":"beginner"}"#)
            .unwrap();
        assert_eq!(plan.name(), "study-plan");

        let help = PresetKind::HomeworkHelp
            .parse(br#"{"question":"why is the sky blue"}"#)
            .unwrap();
        assert_eq!(
            help,
            TaskPreset::HomeworkHelp {
                question: "why is the sky blue".to_string()
            }
        );

        let explain = PresetKind::ConceptExplanation
            .parse(br#"{"concept":"entropy"}"#)
            .unwrap();
        assert_eq!(explain.name(), "explain");
    }

    #[test]
    fn rejects_missing_or_blank_fields() {
        assert!(matches!(
            PresetKind::StudyPlan.parse(br#"{"subject":"calculus"}"#),
            Err(GatewayError::Validation(message)) if message.contains("level")
        ));
        assert!(matches!(
            PresetKind::ConceptExplanation.parse(br#"{"concept":"  "}"#),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            PresetKind::HomeworkHelp.parse(b"[1]"),
            Err(GatewayError::Validation(_))
        ));
    }
}
