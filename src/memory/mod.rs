//! 记忆层：单次运行内只追加的对话日志

pub mod conversation;

pub use conversation::{Conversation, Message, Role};
