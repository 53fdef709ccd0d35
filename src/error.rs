use crate::protocol::error_shapes::error_payload;

/// Error type shared by every request path.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error("server configuration error: {0}")]
    Config(String),
    #[error("upstream API call failed: {status}")]
    Upstream { status: u16, message: String },
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("malformed upstream frame: {0}")]
    Decode(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Configuration,
    Upstream,
    BadGateway,
    ServerError,
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::Validation(_) => ErrorCategory::InvalidRequest,
            GatewayError::Config(_) => ErrorCategory::Configuration,
            GatewayError::Upstream { .. } => ErrorCategory::Upstream,
            GatewayError::Transport(_) => ErrorCategory::BadGateway,
            GatewayError::Decode(_) | GatewayError::Internal(_) => ErrorCategory::ServerError,
        }
    }

    /// HTTP status used when the error is reported before a response has started.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self.category() {
            ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
            ErrorCategory::Configuration | ErrorCategory::ServerError => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
            ErrorCategory::Upstream => match self {
                GatewayError::Upstream { status, .. } => upstream_status(*status),
                _ => http::StatusCode::BAD_GATEWAY,
            },
        }
    }
}

/// Propagate an upstream failure status, falling back to 502 for anything
/// that is not a client or server error.
#[must_use]
fn upstream_status(status: u16) -> http::StatusCode {
    match http::StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => http::StatusCode::BAD_GATEWAY,
    }
}

/// Format an error as `(status, {"error": message})`.
#[must_use]
pub fn format_error(err: &GatewayError) -> (http::StatusCode, serde_json::Value) {
    (err.status_code(), error_payload(&err.to_string()))
}

/// Convert a `GatewayError` into an axum response.
#[must_use]
pub fn into_axum_response(err: &GatewayError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = GatewayError::Validation("messages must be an array".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "messages must be an array");
    }

    #[test]
    fn config_maps_to_internal_error_with_config_message() {
        let err = GatewayError::Config("missing upstream API key".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("server configuration error"));
    }

    #[test]
    fn upstream_status_is_propagated() {
        let err = GatewayError::Upstream {
            status: 402,
            message: "insufficient balance".to_string(),
        };
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"], "upstream API call failed: 402");
    }

    #[test]
    fn upstream_non_error_status_becomes_bad_gateway() {
        let err = GatewayError::Upstream {
            status: 302,
            message: String::new(),
        };
        assert_eq!(err.status_code(), http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn transport_maps_to_bad_gateway() {
        let err = GatewayError::Transport("connection refused".to_string());
        assert_eq!(err.status_code(), http::StatusCode::BAD_GATEWAY);
    }
}
