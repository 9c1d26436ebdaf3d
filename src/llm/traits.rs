//! 推理服务抽象
//!
//! 所有后端（OpenAI 兼容 / 规则 Mock / 脚本回放）实现 ReasoningService：给定完整历史与工具定义，产出一步决策。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::{ToolCallRequest, Turn};
use crate::tools::ToolDefinition;

/// 推理服务一步的输出：可选文本、若干工具调用、是否需要人工输入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStep {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub awaiting_human: bool,
}

impl AgentStep {
    /// 最终回复（无工具调用）
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }

    /// 向客户追问，等待人工输入
    pub fn ask_human(question: impl Into<String>) -> Self {
        Self {
            text: Some(question.into()),
            awaiting_human: true,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// 推理服务错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    /// 端点返回的错误体
    #[error("API error: {0}")]
    Api(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// 脚本推理已无剩余步骤（测试用）
    #[error("Reasoning script exhausted")]
    Exhausted,
}

/// 推理服务 trait
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn step(&self, history: &[Turn], tools: &[ToolDefinition]) -> Result<AgentStep, LlmError>;
}
