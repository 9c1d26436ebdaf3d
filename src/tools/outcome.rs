//! 工具调用结果
//!
//! 三分类：成功 / 业务失败（正常返回但 success=false）/ 瞬时错误（工具以 Err 发出信号）。只有瞬时错误可重试。

use serde_json::Value;
use thiserror::Error;

use crate::memory::ToolStatus;

/// 工具层错误信号
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// 上游不稳定，可重试
    #[error("{0}")]
    Transient(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// 一次工具调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    DomainFailure {
        reason: String,
        message: String,
        payload: Value,
    },
    TransientError(String),
}

impl ToolOutcome {
    /// 将工具返回值分类：Err(Transient) 为瞬时错误，`success: false` 的负载为业务失败
    pub fn classify(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(payload) => {
                if payload.get("success").and_then(Value::as_bool) == Some(false) {
                    let reason = payload
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("failed")
                        .to_string();
                    let message = payload
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    ToolOutcome::DomainFailure {
                        reason,
                        message,
                        payload,
                    }
                } else {
                    ToolOutcome::Success(payload)
                }
            }
            Err(ToolError::Transient(msg)) => ToolOutcome::TransientError(msg),
            Err(ToolError::InvalidArguments(msg)) => ToolOutcome::DomainFailure {
                reason: "invalid_arguments".to_string(),
                message: msg.clone(),
                payload: serde_json::json!({
                    "success": false,
                    "status": "invalid_arguments",
                    "message": msg,
                }),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolOutcome::TransientError(_))
    }

    pub fn status(&self) -> ToolStatus {
        match self {
            ToolOutcome::Success(_) => ToolStatus::Success,
            ToolOutcome::DomainFailure { .. } => ToolStatus::Failed,
            ToolOutcome::TransientError(_) => ToolStatus::Error,
        }
    }

    /// 写入 tool 轮次的内容
    pub fn to_content(&self) -> String {
        match self {
            ToolOutcome::Success(payload) | ToolOutcome::DomainFailure { payload, .. } => {
                payload.to_string()
            }
            ToolOutcome::TransientError(msg) => format!("Error: {}", msg),
        }
    }

    /// 成功负载；瞬时错误永远没有负载
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolOutcome::Success(p) | ToolOutcome::DomainFailure { payload: p, .. } => Some(p),
            ToolOutcome::TransientError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify() {
        let ok = ToolOutcome::classify(Ok(json!({"success": true, "status": "shipped"})));
        assert_eq!(ok.status(), ToolStatus::Success);

        let domain = ToolOutcome::classify(Ok(json!({
            "success": false,
            "status": "refund_blocked",
            "message": "Refund window has closed"
        })));
        match &domain {
            ToolOutcome::DomainFailure { reason, message, .. } => {
                assert_eq!(reason, "refund_blocked");
                assert_eq!(message, "Refund window has closed");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!domain.is_retryable());

        let transient = ToolOutcome::classify(Err(ToolError::Transient("503".into())));
        assert!(transient.is_retryable());
        assert!(transient.payload().is_none());
        assert_eq!(transient.to_content(), "Error: 503");
    }

    #[test]
    fn test_invalid_arguments_is_domain_failure() {
        let outcome = ToolOutcome::classify(Err(ToolError::InvalidArguments("orderId missing".into())));
        assert_eq!(outcome.status(), ToolStatus::Failed);
        assert!(!outcome.is_retryable());
        assert_eq!(outcome.payload().unwrap()["status"], "invalid_arguments");
    }
}
