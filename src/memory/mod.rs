//! 记忆层：LLM 消息与每株植物的短期对话历史

pub mod conversation;

pub use conversation::{ConversationStore, Message, Role};
