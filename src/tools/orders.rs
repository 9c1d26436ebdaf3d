//! 订单管理模拟后端
//!
//! 五个工具共享 Chaos 随机源：按各自的失败画像注入瞬时错误（Err）与业务失败（success=false），
//! 成功时返回合成的追踪号、退款单号等。escalate_to_human 额外注入 2–5 秒延迟（tokio sleep，不阻塞其它会话）。

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::tools::chaos::{Chaos, FailureProfile, Roll};
use crate::tools::schema::{
    parse_args, schema_value, CancelOrderArgs, EscalationArgs, OrderLookupArgs, RefundArgs,
    ReplacementArgs,
};
use crate::tools::{Tool, ToolError, ToolRegistry};

pub const GET_ORDER_STATUS: &str = "get_order_status";
pub const CANCEL_ORDER: &str = "cancel_order";
pub const ISSUE_REFUND: &str = "issue_refund";
pub const REQUEST_REPLACEMENT: &str = "request_replacement";
pub const ESCALATE_TO_HUMAN: &str = "escalate_to_human";

/// 订单可能处于的状态
pub const ORDER_STATUSES: [&str; 4] = ["processing", "shipped", "delivered", "cancelled"];

/// 默认升级工单延迟（毫秒）
pub const DEFAULT_ESCALATION_DELAY_MS: RangeInclusive<u64> = 2000..=5000;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn transient(service: &str) -> ToolError {
    ToolError::Transient(format!(
        "{} temporarily unavailable (503 Service Unavailable). Please retry.",
        service
    ))
}

fn domain_failure(order_id: Option<&str>, reason: &str, message: &str) -> Value {
    let mut v = json!({
        "success": false,
        "status": reason,
        "message": message,
    });
    if let Some(id) = order_id {
        v["orderId"] = json!(id);
    }
    v
}

/// 查询订单状态：20% 瞬时失败，无业务失败；仅 shipped 时附带追踪号
pub struct GetOrderStatusTool {
    chaos: Arc<Chaos>,
}

impl GetOrderStatusTool {
    pub const PROFILE: FailureProfile = FailureProfile::new(0.20, 0.0);

    pub fn new(chaos: Arc<Chaos>) -> Self {
        Self { chaos }
    }
}

#[async_trait]
impl Tool for GetOrderStatusTool {
    fn name(&self) -> &str {
        GET_ORDER_STATUS
    }

    fn description(&self) -> &str {
        "Look up the current status of an order. Args: {\"orderId\": \"A1\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<OrderLookupArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: OrderLookupArgs = parse_args(args)?;
        if self.chaos.roll(Self::PROFILE) == Roll::Transient {
            return Err(transient("Order service"));
        }

        let status = *self.chaos.pick(&ORDER_STATUSES).unwrap_or(&"processing");
        let mut out = json!({
            "success": true,
            "orderId": args.order_id,
            "status": status,
            "lastUpdated": now_rfc3339(),
        });
        match status {
            "shipped" => {
                out["trackingNumber"] = json!(format!("TRK{}", self.chaos.digits(10)));
                let days = self.chaos.range(1..=5) as i64;
                out["estimatedDelivery"] =
                    json!((Utc::now() + chrono::Duration::days(days)).date_naive().to_string());
            }
            "processing" => {
                let days = self.chaos.range(3..=7) as i64;
                out["estimatedDelivery"] =
                    json!((Utc::now() + chrono::Duration::days(days)).date_naive().to_string());
            }
            _ => {}
        }
        Ok(out)
    }
}

/// 取消订单：15% 瞬时失败，30% 需要人工核验（pending_verification）
pub struct CancelOrderTool {
    chaos: Arc<Chaos>,
}

impl CancelOrderTool {
    pub const PROFILE: FailureProfile = FailureProfile::new(0.15, 0.30);

    pub fn new(chaos: Arc<Chaos>) -> Self {
        Self { chaos }
    }
}

#[async_trait]
impl Tool for CancelOrderTool {
    fn name(&self) -> &str {
        CANCEL_ORDER
    }

    fn description(&self) -> &str {
        "Cancel an order that has not shipped yet. Args: {\"orderId\": \"B2\", \"reason\": \"optional\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<CancelOrderArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CancelOrderArgs = parse_args(args)?;
        match self.chaos.roll(Self::PROFILE) {
            Roll::Transient => Err(transient("Cancellation service")),
            Roll::Domain => Ok(domain_failure(
                Some(&args.order_id),
                "pending_verification",
                "This cancellation needs identity verification before it can be processed. \
                 A verification email has been sent to the account holder.",
            )),
            Roll::Success => Ok(json!({
                "success": true,
                "orderId": args.order_id,
                "status": "cancelled",
                "cancellationId": format!("CX-{}", self.chaos.alnum(8)),
                "reason": args.reason.unwrap_or_else(|| "customer_request".to_string()),
                "refundEta": "3-5 business days",
                "cancelledAt": now_rfc3339(),
            })),
        }
    }
}

/// 退款：15% 瞬时失败，25% 被规则拦截（refund_blocked）
pub struct IssueRefundTool {
    chaos: Arc<Chaos>,
}

impl IssueRefundTool {
    pub const PROFILE: FailureProfile = FailureProfile::new(0.15, 0.25);

    pub fn new(chaos: Arc<Chaos>) -> Self {
        Self { chaos }
    }
}

#[async_trait]
impl Tool for IssueRefundTool {
    fn name(&self) -> &str {
        ISSUE_REFUND
    }

    fn description(&self) -> &str {
        "Issue a refund for an order. Args: {\"orderId\": \"C3\", \"amount\": 25.0 (optional), \"reason\": \"damaged item\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<RefundArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RefundArgs = parse_args(args)?;
        if let Some(amount) = args.amount {
            if !(amount.is_finite() && amount > 0.0) {
                return Err(ToolError::InvalidArguments(
                    "amount must be a positive number".to_string(),
                ));
            }
        }
        match self.chaos.roll(Self::PROFILE) {
            Roll::Transient => Err(transient("Payments gateway")),
            Roll::Domain => Ok(domain_failure(
                Some(&args.order_id),
                "refund_blocked",
                "This order is outside the refund window or has already been refunded. \
                 A human agent can review exceptions.",
            )),
            Roll::Success => {
                let amount = args
                    .amount
                    .unwrap_or_else(|| self.chaos.range(1000..=20000) as f64 / 100.0);
                Ok(json!({
                    "success": true,
                    "orderId": args.order_id,
                    "status": "refunded",
                    "refundId": format!("RF-{}", self.chaos.alnum(8)),
                    "amount": amount,
                    "reason": args.reason,
                    "processingDays": self.chaos.range(3..=7),
                }))
            }
        }
    }
}

/// 换货：10% 瞬时失败，30% 缺货（out_of_stock）
pub struct RequestReplacementTool {
    chaos: Arc<Chaos>,
}

impl RequestReplacementTool {
    pub const PROFILE: FailureProfile = FailureProfile::new(0.10, 0.30);

    pub fn new(chaos: Arc<Chaos>) -> Self {
        Self { chaos }
    }
}

#[async_trait]
impl Tool for RequestReplacementTool {
    fn name(&self) -> &str {
        REQUEST_REPLACEMENT
    }

    fn description(&self) -> &str {
        "Ship a replacement for a damaged or wrong item. Args: {\"orderId\": \"D4\", \"itemId\": \"optional\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<ReplacementArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ReplacementArgs = parse_args(args)?;
        match self.chaos.roll(Self::PROFILE) {
            Roll::Transient => Err(transient("Warehouse service")),
            Roll::Domain => Ok(domain_failure(
                Some(&args.order_id),
                "out_of_stock",
                "The item is currently out of stock. A refund can be issued instead.",
            )),
            Roll::Success => {
                let mut out = json!({
                    "success": true,
                    "orderId": args.order_id,
                    "status": "replacement_created",
                    "replacementOrderId": format!("RPL-{}", self.chaos.alnum(8)),
                    "trackingNumber": format!("TRK{}", self.chaos.digits(10)),
                });
                if let Some(item) = args.item_id {
                    out["itemId"] = json!(item);
                }
                Ok(out)
            }
        }
    }
}

/// 升级人工：10% 瞬时失败，20% 信息不足（needs_more_info）；执行前随机延迟
pub struct EscalateToHumanTool {
    chaos: Arc<Chaos>,
    delay_ms: RangeInclusive<u64>,
}

impl EscalateToHumanTool {
    pub const PROFILE: FailureProfile = FailureProfile::new(0.10, 0.20);

    pub fn new(chaos: Arc<Chaos>) -> Self {
        Self::with_delay(chaos, DEFAULT_ESCALATION_DELAY_MS)
    }

    pub fn with_delay(chaos: Arc<Chaos>, delay_ms: RangeInclusive<u64>) -> Self {
        Self { chaos, delay_ms }
    }
}

#[async_trait]
impl Tool for EscalateToHumanTool {
    fn name(&self) -> &str {
        ESCALATE_TO_HUMAN
    }

    fn description(&self) -> &str {
        "Hand the conversation to a human support agent. Args: {\"summary\": \"...\", \"orderId\": \"optional\", \"priority\": \"low|normal|high\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<EscalationArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: EscalationArgs = parse_args(args)?;
        let delay: Duration = self.chaos.delay(self.delay_ms.clone());
        tokio::time::sleep(delay).await;

        match self.chaos.roll(Self::PROFILE) {
            Roll::Transient => Err(transient("Ticketing system")),
            Roll::Domain => Ok(domain_failure(
                args.order_id.as_deref(),
                "needs_more_info",
                "A human agent needs more details (order number and a short description of the problem) \
                 before the ticket can be opened.",
            )),
            Roll::Success => {
                let mut out = json!({
                    "success": true,
                    "status": "escalated",
                    "ticketId": format!("ESC-{}", self.chaos.alnum(8)),
                    "priority": args.priority.unwrap_or_else(|| "normal".to_string()),
                    "estimatedWaitMinutes": self.chaos.range(5..=30),
                    "summary": args.summary,
                });
                if let Some(id) = args.order_id {
                    out["orderId"] = json!(id);
                }
                Ok(out)
            }
        }
    }
}

/// 构建固定的订单工具目录（声明顺序即对推理服务暴露的顺序）
pub fn order_desk_registry(chaos: Arc<Chaos>, escalation_delay_ms: RangeInclusive<u64>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(GetOrderStatusTool::new(Arc::clone(&chaos)));
    tools.register(CancelOrderTool::new(Arc::clone(&chaos)));
    tools.register(IssueRefundTool::new(Arc::clone(&chaos)));
    tools.register(RequestReplacementTool::new(Arc::clone(&chaos)));
    tools.register(EscalateToHumanTool::with_delay(chaos, escalation_delay_ms));
    tools
}
