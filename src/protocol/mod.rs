pub mod chat;
pub mod error_shapes;
pub mod prompt;
pub mod upstream;

pub use chat::{ConversationRequest, Message, PlainChatRequest, Role};
pub use prompt::{enhance_conversation, plain_chat_conversation, TaskPreset};
pub use upstream::{
    decode_completion, decode_relay_payload, decode_stream_payload, Completion, RelayEvent,
    ReplyBody, UpstreamEvent, UpstreamRequest, Usage, DONE_SENTINEL, NO_REPLY_FALLBACK,
};
