//! 工具参数 JSON Schema 生成（schemars）
//!
//! 每个订单工具的参数都是一个强类型结构体；Schema 由 schemars 自动生成并随 ToolDefinition 交给推理服务。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::ToolError;

/// get_order_status 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLookupArgs {
    /// 订单号，如 A1
    pub order_id: String,
}

/// cancel_order 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderArgs {
    pub order_id: String,
    /// 取消原因（可选）
    #[serde(default)]
    pub reason: Option<String>,
}

/// issue_refund 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefundArgs {
    pub order_id: String,
    /// 退款金额；缺省为全额
    #[serde(default)]
    pub amount: Option<f64>,
    pub reason: String,
}

/// request_replacement 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementArgs {
    pub order_id: String,
    /// 需要更换的商品；缺省为整单
    #[serde(default)]
    pub item_id: Option<String>,
}

/// escalate_to_human 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EscalationArgs {
    /// 给人工客服的问题摘要
    pub summary: String,
    #[serde(default)]
    pub order_id: Option<String>,
    /// low / normal / high
    #[serde(default)]
    pub priority: Option<String>,
}

/// 生成参数 Schema（JSON 值）
pub fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| {
        serde_json::json!({ "type": "object", "properties": {}, "required": [] })
    })
}

/// 将 JSON 参数解析为强类型结构体；失败为 InvalidArguments
pub fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_uses_camel_case_and_required() {
        let schema = schema_value::<RefundArgs>();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("orderId"));
        assert!(props.contains_key("amount"));
        let required: Vec<_> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"orderId"));
        assert!(required.contains(&"reason"));
        assert!(!required.contains(&"amount"));
    }

    #[test]
    fn test_parse_args() {
        let ok: OrderLookupArgs = parse_args(json!({"orderId": "A1"})).unwrap();
        assert_eq!(ok.order_id, "A1");
        let err = parse_args::<OrderLookupArgs>(json!({"order": "A1"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
