//! 会话轮次（Turn）
//!
//! 一个会话由有序的 user / agent / tool 轮次组成；tool 轮次总是引用注册表中存在的工具名。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolOutcome;

/// 轮次角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    Tool,
}

/// 推理服务请求的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// tool 轮次的结果分类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failed,
    Error,
}

/// 单个轮次
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_status: Option<ToolStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_name: None,
            tool_status: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::plain(Role::Agent, content.into())
    }

    /// agent 轮次，附带本步请求的工具调用
    pub fn agent_with_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Agent, content.into())
        }
    }

    /// tool 轮次：结果序列化进 content（成功/业务失败为 JSON，瞬时错误为 `Error: ...`）
    pub fn tool(call: &ToolCallRequest, outcome: &ToolOutcome) -> Self {
        Self {
            tool_name: Some(call.name.clone()),
            tool_status: Some(outcome.status()),
            tool_call_id: Some(call.id.clone()),
            ..Self::plain(Role::Tool, outcome.to_content())
        }
    }

    /// toolContent 的别名：tool 轮次的内容即工具输出
    pub fn tool_content(&self) -> Option<&str> {
        match self.role {
            Role::Tool => Some(self.content.as_str()),
            _ => None,
        }
    }
}
