//! 状态翻译：把原始事件映射为面向用户的进度文案
//!
//! 纯函数、全函数：同一事件永远得到同一结果。分类规则是显式的有序表，按优先级匹配：
//! 工具调用请求 > agent 文本标记 > 工具结果 > 等待人工。每个事件还会原样转发为 chunk。

use serde_json::Value;

use crate::memory::{Role, ToolStatus, Turn};
use crate::react::RawEvent;

/// 参数预览最大字符数
const PREVIEW_CHARS: usize = 50;

/// 作为「主要文本参数」的候选键，按优先级
const PRIMARY_ARG_KEYS: &[&str] = &["summary", "reason", "query", "orderId"];

/// agent 文本中的标记 → 状态文案
#[derive(Debug, Clone, Copy)]
pub struct MarkerRule {
    pub marker: &'static str,
    pub message: &'static str,
}

/// 按优先级排列：命中第一条即停止
pub const AGENT_TEXT_RULES: &[MarkerRule] = &[
    MarkerRule {
        marker: "<|channel|>final",
        message: "Agent is generating final response...",
    },
    MarkerRule {
        marker: "<|channel|>analysis",
        message: "Agent is analyzing the situation...",
    },
    MarkerRule {
        marker: "<|channel|>commentary",
        message: "Agent is processing tool results...",
    },
];

/// 有文本但无标记
pub const THINKING_STATUS: &str = "Agent is thinking...";
/// 文本为空
pub const DEFAULT_AGENT_STATUS: &str = "Agent is analyzing your request...";
pub const FOLLOWUP_STATUS: &str = "Waiting for human input...";

/// 非结构化工具输出中表示错误的子串（小写匹配）
const ERROR_INDICATORS: &[&str] = &["timeout", "timed out", "error"];
const FAILURE_INDICATORS: &[&str] = &["fail"];

/// 面向客户端的更新；时间戳由传输层附加，翻译本身保持纯函数
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Status { message: String },
    Chunk { content: Value },
    Done,
    Error { error: String },
}

/// 原始事件 → 至多一条 status
pub fn translate(event: &RawEvent) -> Option<StatusUpdate> {
    let message = match event {
        RawEvent::Agent { turns } => agent_status(turns)?,
        RawEvent::Tool { turns } => tool_status(turns)?,
        RawEvent::Followup { .. } => FOLLOWUP_STATUS.to_string(),
    };
    Some(StatusUpdate::Status { message })
}

/// 原始事件 → 可选 status + 必有的 chunk（增强而非替换原始流）
pub fn augment(event: &RawEvent) -> Vec<StatusUpdate> {
    let mut out = Vec::with_capacity(2);
    if let Some(status) = translate(event) {
        out.push(status);
    }
    let content = serde_json::to_value(event).unwrap_or_else(|e| {
        serde_json::json!({ "event": event.kind(), "serializationError": e.to_string() })
    });
    out.push(StatusUpdate::Chunk { content });
    out
}

fn agent_status(turns: &[Turn]) -> Option<String> {
    let agent_turns: Vec<&Turn> = turns.iter().filter(|t| t.role == Role::Agent).collect();
    if agent_turns.is_empty() {
        return None;
    }

    if let Some(call) = agent_turns.iter().flat_map(|t| t.tool_calls.iter()).next() {
        let mut message = format!("Agent calling tool: {}", call.name);
        if let Some(preview) = primary_arg_preview(&call.args) {
            message.push_str(" - ");
            message.push_str(&preview);
        }
        return Some(message);
    }

    let content: String = agent_turns
        .iter()
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let message = match AGENT_TEXT_RULES.iter().find(|rule| content.contains(rule.marker)) {
        Some(rule) => rule.message,
        None if content.trim().is_empty() => DEFAULT_AGENT_STATUS,
        None => THINKING_STATUS,
    };
    Some(message.to_string())
}

fn tool_status(turns: &[Turn]) -> Option<String> {
    let turn = turns.iter().rev().find(|t| t.role == Role::Tool)?;
    let name = turn.tool_name.as_deref().unwrap_or("unknown");
    let suffix = match classify_tool_content(&turn.content) {
        ToolStatus::Success => "(success)",
        ToolStatus::Failed => "(failed)",
        ToolStatus::Error => "(error)",
    };
    Some(format!("Tool {}: {}", name, suffix))
}

/// 优先解析结构化负载；非 JSON 时退回子串匹配
pub fn classify_tool_content(content: &str) -> ToolStatus {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) {
        match map.get("success").and_then(Value::as_bool) {
            Some(true) => return ToolStatus::Success,
            Some(false) => return ToolStatus::Failed,
            None if map.contains_key("error") => return ToolStatus::Error,
            None => {}
        }
    }
    let lower = content.to_lowercase();
    if ERROR_INDICATORS.iter().any(|s| lower.contains(s)) {
        ToolStatus::Error
    } else if FAILURE_INDICATORS.iter().any(|s| lower.contains(s)) {
        ToolStatus::Failed
    } else {
        ToolStatus::Success
    }
}

/// 主要文本参数的预览：超过 50 字符截断并加省略号
fn primary_arg_preview(args: &Value) -> Option<String> {
    let obj = args.as_object()?;
    let text = PRIMARY_ARG_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .or_else(|| obj.values().find_map(Value::as_str))?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > PREVIEW_CHARS {
        Some(format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>()))
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;
    use crate::tools::ToolOutcome;
    use serde_json::json;

    fn status_of(event: &RawEvent) -> Option<String> {
        match translate(event) {
            Some(StatusUpdate::Status { message }) => Some(message),
            _ => None,
        }
    }

    fn agent(content: &str) -> RawEvent {
        RawEvent::Agent {
            turns: vec![Turn::agent(content)],
        }
    }

    #[test]
    fn test_tool_call_request_with_preview() {
        let call = ToolCallRequest::new("c", "escalate_to_human", json!({
            "summary": "Customer received a broken blender and wants to speak to someone today",
            "priority": "high"
        }));
        let ev = RawEvent::Agent {
            turns: vec![Turn::agent_with_calls("<|channel|>final ignored", vec![call])],
        };
        assert_eq!(
            status_of(&ev).unwrap(),
            "Agent calling tool: escalate_to_human - Customer received a broken blender and wants to sp..."
        );
    }

    #[test]
    fn test_tool_call_without_text_args() {
        let call = ToolCallRequest::new("c", "issue_refund", json!({"amount": 10.0}));
        let ev = RawEvent::Agent {
            turns: vec![Turn::agent_with_calls("", vec![call])],
        };
        assert_eq!(status_of(&ev).unwrap(), "Agent calling tool: issue_refund");

        let call = ToolCallRequest::new("c", "get_order_status", json!({"orderId": "A1"}));
        let ev = RawEvent::Agent {
            turns: vec![Turn::agent_with_calls("", vec![call])],
        };
        assert_eq!(status_of(&ev).unwrap(), "Agent calling tool: get_order_status - A1");
    }

    #[test]
    fn test_marker_rules_in_priority_order() {
        assert_eq!(
            status_of(&agent("<|channel|>analysis ... <|channel|>final Done")).unwrap(),
            "Agent is generating final response..."
        );
        assert_eq!(
            status_of(&agent("<|channel|>analysis thinking")).unwrap(),
            "Agent is analyzing the situation..."
        );
        assert_eq!(
            status_of(&agent("<|channel|>commentary results")).unwrap(),
            "Agent is processing tool results..."
        );
        assert_eq!(status_of(&agent("Your order shipped.")).unwrap(), THINKING_STATUS);
        assert_eq!(status_of(&agent("<think>hmm")).unwrap(), THINKING_STATUS);
        assert_eq!(status_of(&agent("")).unwrap(), DEFAULT_AGENT_STATUS);
        assert_eq!(status_of(&agent("  \n")).unwrap(), DEFAULT_AGENT_STATUS);
    }

    #[test]
    fn test_tool_event_suffixes() {
        let call = ToolCallRequest::new("c", "cancel_order", json!({"orderId": "B2"}));
        let cases = [
            (ToolOutcome::Success(json!({"success": true})), "Tool cancel_order: (success)"),
            (
                ToolOutcome::classify(Ok(json!({"success": false, "status": "pending_verification"}))),
                "Tool cancel_order: (failed)",
            ),
            (ToolOutcome::TransientError("503".into()), "Tool cancel_order: (error)"),
        ];
        for (outcome, expected) in cases {
            let ev = RawEvent::Tool {
                turns: vec![Turn::tool(&call, &outcome)],
            };
            assert_eq!(status_of(&ev).unwrap(), expected);
        }
    }

    #[test]
    fn test_unstructured_tool_content() {
        assert_eq!(classify_tool_content("{\"error\": \"boom\"}"), ToolStatus::Error);
        assert_eq!(classify_tool_content("request timed out"), ToolStatus::Error);
        assert_eq!(classify_tool_content("operation failed"), ToolStatus::Failed);
        assert_eq!(classify_tool_content("all good"), ToolStatus::Success);
    }

    #[test]
    fn test_followup_and_empty_events() {
        let ev = RawEvent::Followup {
            turns: vec![Turn::agent("Which order?")],
        };
        assert_eq!(status_of(&ev).unwrap(), FOLLOWUP_STATUS);
        assert!(translate(&RawEvent::Tool { turns: vec![] }).is_none());
        assert!(translate(&RawEvent::Agent { turns: vec![] }).is_none());
    }

    #[test]
    fn test_augment_is_pure_and_always_forwards_chunk() {
        let ev = agent("hello");
        assert_eq!(augment(&ev), augment(&ev));

        let updates = augment(&RawEvent::Tool { turns: vec![] });
        assert_eq!(updates.len(), 1);
        match &updates[0] {
            StatusUpdate::Chunk { content } => assert_eq!(content["event"], "tool_event"),
            other => panic!("expected chunk, got {:?}", other),
        }

        let updates = augment(&ev);
        assert!(matches!(updates[0], StatusUpdate::Status { .. }));
        assert!(matches!(updates[1], StatusUpdate::Chunk { .. }));
    }
}
