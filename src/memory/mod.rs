//! 记忆层：会话消息、持久化日志、上下文文件、目录大纲

pub mod context_file;
pub mod conversation;
pub mod message_log;
pub mod outline;

pub use context_file::{display_name_for, ContextFile};
pub use conversation::{ConversationMemory, Message, Role};
pub use message_log::{MessageLog, MAX_LOG_BYTES, ROTATION_KEEP_LINES};
pub use outline::directory_outline;
