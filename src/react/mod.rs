//! 编排层：原始事件、编排主循环、状态翻译

pub mod events;
pub mod loop_;
pub mod status;

pub use events::RawEvent;
pub use loop_::{step_limit_message, EventStream, Orchestrator, DEFAULT_MAX_STEPS};
pub use status::{augment, classify_tool_content, translate, StatusUpdate};
