use axum::body::Body;
use axum::response::Response;
use futures_util::Stream;

use crate::error::{into_axum_response, GatewayError};
use crate::stream::OutputEncoding;

#[inline]
pub(crate) fn ok_json_response<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = http::StatusCode::OK;
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(err) => into_axum_response(&GatewayError::Internal(format!(
            "failed to encode response: {err}"
        ))),
    }
}

/// Incremental `200` response with the headers of the chosen encoding.
pub(crate) fn streaming_response<S>(body: S, encoding: OutputEncoding) -> Response
where
    S: Stream<Item = Result<bytes::Bytes, std::io::Error>> + Send + 'static,
{
    streaming_response_from_body(Body::from_stream(body), encoding)
}

pub(crate) fn streaming_response_from_body(body: Body, encoding: OutputEncoding) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(encoding.content_type()),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

/// Log an error reported before the response started and render it.
pub(crate) fn error_response(request_id: &str, err: &GatewayError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(request_id, status = status.as_u16(), error = %err, "request failed");
    } else {
        tracing::warn!(request_id, status = status.as_u16(), error = %err, "request rejected");
    }
    into_axum_response(err)
}
