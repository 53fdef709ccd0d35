pub mod reasoning;
pub mod relay;
pub mod sse;

pub use reasoning::{strip_reasoning, FilterMode, ReasoningFilter, END_MARKER, START_MARKER};
pub use relay::{relay_stream, OutputEncoding};
pub use sse::{content_record, data_frame_stream, error_record, SseLineDecoder, DONE_RECORD};
