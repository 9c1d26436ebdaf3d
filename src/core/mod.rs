//! 核心层：错误类型、会话监管、对话服务

pub mod error;
pub mod service;
pub mod session_supervisor;

pub use error::AgentError;
pub use service::{ChatService, ChatStream};
pub use session_supervisor::{RunGuard, SessionSupervisor};
