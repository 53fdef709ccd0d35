/// Client-facing error body: `{"error": message}`.
///
/// The same shape is used for HTTP error responses and for the in-band error
/// record of a relayed event stream.
#[must_use]
pub fn error_payload(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}
