pub(crate) mod common;
pub mod chat;
pub mod health;
pub mod plain_chat;
pub mod presets;
