//! 编排过程事件：对外可观察的最小单位，按推理/执行步骤完成的顺序发出

use serde::Serialize;

use crate::memory::Turn;

/// 单步原始事件（可序列化为 JSON，作为 chunk 原样转发给前端）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RawEvent {
    /// 推理服务产出的 agent 轮次（文本和/或工具调用请求）
    #[serde(rename = "agent_event")]
    Agent { turns: Vec<Turn> },
    /// 工具执行结果轮次
    #[serde(rename = "tool_event")]
    Tool { turns: Vec<Turn> },
    /// 推理服务需要人工输入
    #[serde(rename = "followup_event")]
    Followup { turns: Vec<Turn> },
}

impl RawEvent {
    pub fn turns(&self) -> &[Turn] {
        match self {
            RawEvent::Agent { turns } | RawEvent::Tool { turns } | RawEvent::Followup { turns } => {
                turns
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::Agent { .. } => "agent_event",
            RawEvent::Tool { .. } => "tool_event",
            RawEvent::Followup { .. } => "followup_event",
        }
    }
}
