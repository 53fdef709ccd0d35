use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary. The credential itself is
/// never echoed, only whether one is configured.
pub fn health_handler(state: &AppState) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "assistant-gateway is running",
        "requests_seen": state.requests_seen(),
        "config": {
            "upstream": {
                "endpoint": state.upstream.chat_url(),
                "reasoning_model": config.upstream.reasoning_model,
                "chat_model": config.upstream.chat_model,
                "credential_configured": state.upstream.has_credential(),
            },
            "features": {
                "log_level": config.features.log_level,
                "custom_reasoning_template": config.features.reasoning_prompt_template.is_some(),
            }
        }
    }))
}
