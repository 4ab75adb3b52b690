//! 记忆层：对话消息与按角色裁剪的历史窗口

pub mod conversation;

pub use conversation::{HistoryWindow, Message, Role};
