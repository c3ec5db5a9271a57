//! 记忆层：对话消息结构

pub mod conversation;

pub use conversation::{Message, Role};
