//! 记忆层：会话轮次、检查点存储、会话存储

pub mod checkpoint;
pub mod conversation;
pub mod session_store;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, SessionState};
pub use conversation::{Role, ToolCallRequest, ToolStatus, Turn};
pub use session_store::SessionStore;
