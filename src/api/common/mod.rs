//! Shared API helpers reused across route handlers.

mod io;
mod response;

pub(crate) use io::CompletionCall;
pub(crate) use response::{
    error_response, ok_json_response, streaming_response, streaming_response_from_body,
};
