//! 本地推理实现（无需 API）
//!
//! - ScriptedReasoner：按顺序回放预设步骤，并记录每次收到的历史，供测试断言。
//! - RuleBasedReasoner：关键词意图识别 + 正则提取订单号，便于本地跑通「调用工具 → 汇总结果」全流程；
//!   工具返回瞬时错误时最多重发两次同一调用（重试由推理层决定，编排器只负责如实回传）。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use self::intent::{extract_order_id, intent_of, Intent};
use crate::llm::{AgentStep, LlmError, ReasoningService};
use crate::memory::{Role, ToolCallRequest, ToolStatus, Turn};
use crate::tools::{
    ToolDefinition, CANCEL_ORDER, ESCALATE_TO_HUMAN, GET_ORDER_STATUS, ISSUE_REFUND,
    REQUEST_REPLACEMENT,
};

/// 同一工具调用在一次用户请求内最多重发次数
const MAX_RETRIES: usize = 2;

/// 回放预设步骤；脚本耗尽时返回 LlmError::Exhausted
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    steps: Mutex<VecDeque<Result<AgentStep, LlmError>>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedReasoner {
    pub fn new(steps: impl IntoIterator<Item = AgentStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().map(Ok).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 追加一步（可以是错误，模拟推理服务故障）
    pub fn push(&self, step: Result<AgentStep, LlmError>) {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
    }

    /// 每次 step 调用时收到的历史快照
    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn step(&self, history: &[Turn], _tools: &[ToolDefinition]) -> Result<AgentStep, LlmError> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(history.to_vec());
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Err(LlmError::Exhausted))
    }
}

/// 规则推理：只看最后一条用户消息之后的轮次
#[derive(Debug, Default)]
pub struct RuleBasedReasoner;

impl RuleBasedReasoner {
    pub fn new() -> Self {
        Self
    }

    fn plan(&self, history: &[Turn], user_idx: usize, tools: &[ToolDefinition]) -> AgentStep {
        let text = history[user_idx].content.as_str();
        // 当前消息没有意图时（例如只回复了订单号），沿用最近一次用户意图
        let intent = intent_of(text).or_else(|| {
            history[..user_idx]
                .iter()
                .rev()
                .filter(|t| t.role == Role::User)
                .find_map(|t| intent_of(&t.content))
        });
        let Some(intent) = intent else {
            return AgentStep::reply(
                "Hi! I can check an order's status, cancel an order, issue a refund, \
                 arrange a replacement, or connect you with a human agent. What can I do for you?",
            );
        };

        let order_id = extract_order_id(text).or_else(|| {
            history[..user_idx]
                .iter()
                .rev()
                .filter(|t| t.role == Role::User)
                .find_map(|t| extract_order_id(&t.content))
        });
        let tool = intent.tool();
        if !tools.iter().any(|d| d.name == tool) {
            return AgentStep::reply(format!(
                "Sorry, I can't {} right now because that service isn't available.",
                intent.action()
            ));
        }

        let args = match (intent, order_id) {
            (Intent::Escalate, order_id) => {
                let mut args = json!({ "summary": text, "priority": "normal" });
                if let Some(id) = order_id {
                    args["orderId"] = json!(id);
                }
                args
            }
            (_, None) => {
                return AgentStep::ask_human(format!(
                    "Could you share your order number (for example A1) so I can {}?",
                    intent.action()
                ));
            }
            (Intent::Cancel, Some(id)) => json!({ "orderId": id, "reason": text }),
            (Intent::Refund, Some(id)) => json!({ "orderId": id, "reason": text }),
            (Intent::Replace, Some(id)) => json!({ "orderId": id }),
            (Intent::Status, Some(id)) => json!({ "orderId": id }),
        };

        AgentStep::calls(vec![new_call(tool, args)])
            .with_text(format!("Let me {} for you.", intent.action()))
    }

    /// 最新一批工具结果：瞬时错误且未超重试上限则重发，否则汇总回复
    fn react_to_tools(&self, since_user: &[Turn]) -> AgentStep {
        let Some(agent_idx) = since_user
            .iter()
            .rposition(|t| t.role == Role::Agent && !t.tool_calls.is_empty())
        else {
            return AgentStep::reply("How else can I help?");
        };
        let calls = &since_user[agent_idx].tool_calls;
        let results: Vec<&Turn> = since_user[agent_idx + 1..]
            .iter()
            .filter(|t| t.role == Role::Tool)
            .collect();

        let retries: Vec<ToolCallRequest> = results
            .iter()
            .filter(|t| t.tool_status == Some(ToolStatus::Error))
            .filter_map(|t| calls.iter().find(|c| Some(&c.id) == t.tool_call_id.as_ref()))
            .filter(|c| attempts_for(since_user, &c.name) <= MAX_RETRIES)
            .map(|c| new_call(&c.name, c.args.clone()))
            .collect();
        if !retries.is_empty() {
            let names: Vec<String> = retries.iter().map(|c| c.name.clone()).collect();
            return AgentStep::calls(retries).with_text(format!(
                "The backend had a temporary problem, retrying {}.",
                names.join(", ")
            ));
        }

        let summary: Vec<String> = results.iter().map(|t| summarize(t)).collect();
        AgentStep::reply(summary.join("\n"))
    }
}

#[async_trait]
impl ReasoningService for RuleBasedReasoner {
    async fn step(&self, history: &[Turn], tools: &[ToolDefinition]) -> Result<AgentStep, LlmError> {
        let user_idx = history
            .iter()
            .rposition(|t| t.role == Role::User)
            .ok_or_else(|| LlmError::InvalidResponse("history has no user turn".to_string()))?;
        let since_user = &history[user_idx + 1..];
        match since_user.last() {
            None => Ok(self.plan(history, user_idx, tools)),
            Some(t) if t.role == Role::Tool => Ok(self.react_to_tools(since_user)),
            Some(_) => Ok(AgentStep::reply("How else can I help?")),
        }
    }
}

fn new_call(name: &str, args: Value) -> ToolCallRequest {
    ToolCallRequest::new(format!("call_{}", uuid::Uuid::new_v4().simple()), name, args)
}

/// 本次用户请求内某工具已被调用的次数
fn attempts_for(since_user: &[Turn], tool: &str) -> usize {
    since_user
        .iter()
        .filter(|t| t.role == Role::Agent)
        .flat_map(|t| t.tool_calls.iter())
        .filter(|c| c.name == tool)
        .count()
}

fn summarize(turn: &Turn) -> String {
    let tool = turn.tool_name.as_deref().unwrap_or("tool");
    let Ok(v) = serde_json::from_str::<Value>(&turn.content) else {
        return format!(
            "I couldn't reach the system behind {} after a few attempts. \
             Please try again shortly, or ask me to connect you with a human agent.",
            tool
        );
    };
    let s = |k: &str| v.get(k).and_then(Value::as_str).unwrap_or("").to_string();
    if v.get("success").and_then(Value::as_bool) != Some(true) {
        return format!("I wasn't able to complete that: {}", s("message"));
    }
    match tool {
        GET_ORDER_STATUS => {
            let mut line = format!("Order {} is currently {}.", s("orderId"), s("status"));
            if v.get("trackingNumber").is_some() {
                line.push_str(&format!(" Tracking number: {}.", s("trackingNumber")));
            }
            if v.get("estimatedDelivery").is_some() {
                line.push_str(&format!(" Estimated delivery: {}.", s("estimatedDelivery")));
            }
            line
        }
        CANCEL_ORDER => format!(
            "Order {} has been cancelled (confirmation {}). Your refund should arrive in {}.",
            s("orderId"),
            s("cancellationId"),
            s("refundEta")
        ),
        ISSUE_REFUND => format!(
            "A refund of ${:.2} for order {} was issued (refund {}). It takes about {} business days to appear.",
            v.get("amount").and_then(Value::as_f64).unwrap_or_default(),
            s("orderId"),
            s("refundId"),
            v.get("processingDays").and_then(Value::as_u64).unwrap_or_default()
        ),
        REQUEST_REPLACEMENT => format!(
            "A replacement for order {} is on its way (order {}, tracking {}).",
            s("orderId"),
            s("replacementOrderId"),
            s("trackingNumber")
        ),
        ESCALATE_TO_HUMAN => format!(
            "I've connected you with a human agent (ticket {}). Expected wait: about {} minutes.",
            s("ticketId"),
            v.get("estimatedWaitMinutes").and_then(Value::as_u64).unwrap_or_default()
        ),
        _ => format!("{} finished: {}", tool, turn.content),
    }
}

/// 意图识别与订单号提取（正则编译一次）
mod intent {
    use std::sync::OnceLock;

    use regex::Regex;

    use crate::tools::{
        CANCEL_ORDER, ESCALATE_TO_HUMAN, GET_ORDER_STATUS, ISSUE_REFUND, REQUEST_REPLACEMENT,
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Intent {
        Escalate,
        Cancel,
        Refund,
        Replace,
        Status,
    }

    impl Intent {
        pub fn tool(self) -> &'static str {
            match self {
                Intent::Escalate => ESCALATE_TO_HUMAN,
                Intent::Cancel => CANCEL_ORDER,
                Intent::Refund => ISSUE_REFUND,
                Intent::Replace => REQUEST_REPLACEMENT,
                Intent::Status => GET_ORDER_STATUS,
            }
        }

        pub fn action(self) -> &'static str {
            match self {
                Intent::Escalate => "connect you with a human agent",
                Intent::Cancel => "cancel the order",
                Intent::Refund => "process the refund",
                Intent::Replace => "arrange a replacement",
                Intent::Status => "check the order status",
            }
        }
    }

    /// 按优先级排列的意图规则
    fn rules() -> &'static [(Intent, Regex)] {
        static RULES: OnceLock<Vec<(Intent, Regex)>> = OnceLock::new();
        RULES.get_or_init(|| {
            [
                (Intent::Escalate, r"(?i)\b(human|person|representative|manager|escalat\w*|real agent)\b"),
                (Intent::Cancel, r"(?i)\bcancel\w*\b"),
                (Intent::Refund, r"(?i)\b(refund\w*|money back)\b"),
                (Intent::Replace, r"(?i)\b(replace\w*|exchange|broken|damaged|wrong item)\b"),
                (Intent::Status, r"(?i)\b(status|where|track\w*|shipped|deliver\w*|arriv\w*)\b"),
            ]
            .into_iter()
            .filter_map(|(intent, pattern)| Regex::new(pattern).ok().map(|re| (intent, re)))
            .collect()
        })
    }

    pub fn intent_of(text: &str) -> Option<Intent> {
        rules()
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(intent, _)| *intent)
    }

    /// 订单号：`order #A1` / `order 1234` 或独立的「字母+数字」标识
    pub fn extract_order_id(text: &str) -> Option<String> {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                r"(?i)\border\s*(?:number|no\.?|id)?\s*#?\s*([A-Z0-9][A-Z0-9-]{0,15})\b",
                r"\b([A-Z]{1,3}-?\d{1,10})\b",
                r"#(\d{3,12})\b",
            ]
            .into_iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
        });
        patterns.iter().find_map(|re| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .filter(|id| id.chars().any(|c| c.is_ascii_digit()))
        })
    }
}
