//! order-desk：订单客服智能体的会话编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话监管、对话服务
//! - **llm**: 推理服务抽象与实现（OpenAI 兼容 / 规则 / 脚本回放）
//! - **memory**: 会话轮次、检查点与会话存储
//! - **react**: 编排主循环、原始事件与状态翻译
//! - **tools**: 工具注册表、模拟订单后端与执行器
//! - **transport**: 帧编码与流式推送
//! - **server**: HTTP 路由（feature `web`）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
#[cfg(feature = "web")]
pub mod server;
pub mod tools;
pub mod transport;

pub use crate::core::{AgentError, ChatService, ChatStream};
