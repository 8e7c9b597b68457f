//! 记忆层：会话消息模型、有界会话存储与持久化后端

pub mod conversation;
pub mod persistence;
pub mod store;

pub use conversation::{Attachment, Message, Role, ToolCall, ToolResult};
pub use persistence::{InMemoryBackend, JsonFileBackend, MemoryBackend, PersistError};
pub use store::{AgentMemory, ConversationStore, DEFAULT_MAX_RETAINED};
