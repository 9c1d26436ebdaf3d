//! Agent 错误类型
//!
//! run 边界以下的故障都转为结构化事件；只有这里列出的错误会作为终止帧（error）送达客户端。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排过程中可能出现的错误（输入、推理服务、工具、序列化、存储等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 客户端输入错误：消息为空或仅含空白，流打开之前即拒绝
    #[error("message is required")]
    EmptyMessage,

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 客户端断开或服务关闭，run 在下一个挂起点放弃
    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        AgentError::LlmError(e.to_string())
    }
}

impl AgentError {
    /// 是否为客户端输入错误（对应 HTTP 400）
    pub fn is_client_error(&self) -> bool {
        matches!(self, AgentError::EmptyMessage)
    }
}
