//! 工具层：注册表、参数 schema、模拟订单后端与执行器

pub mod chaos;
pub mod executor;
pub mod orders;
pub mod outcome;
pub mod registry;
pub mod schema;

pub use chaos::{Chaos, FailureProfile, Roll};
pub use executor::ToolExecutor;
pub use orders::{
    order_desk_registry, CancelOrderTool, EscalateToHumanTool, GetOrderStatusTool,
    IssueRefundTool, RequestReplacementTool, CANCEL_ORDER, ESCALATE_TO_HUMAN, GET_ORDER_STATUS,
    ISSUE_REFUND, ORDER_STATUSES, REQUEST_REPLACEMENT,
};
pub use outcome::{ToolError, ToolOutcome};
pub use registry::{Tool, ToolDefinition, ToolRegistry};
