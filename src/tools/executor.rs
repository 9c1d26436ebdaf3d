//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，invoke(tool_name, args) 在超时内调用工具并把结果分类为 ToolOutcome；
//! 超时视为瞬时错误，未注册的工具名为 HallucinatedTool；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{Tool, ToolDefinition, ToolOutcome, ToolRegistry};

/// 工具执行器：单次调用、无批处理
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具；不抛出工具层失败，只有未知工具返回 Err
    pub async fn invoke(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::HallucinatedTool(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let outcome = match timeout(self.timeout, tool.execute(args)).await {
            Ok(result) => ToolOutcome::classify(result),
            Err(_) => ToolOutcome::TransientError(
                AgentError::ToolTimeout(tool_name.to_string()).to_string(),
            ),
        };

        let class = match &outcome {
            ToolOutcome::Success(_) => "success",
            ToolOutcome::DomainFailure { .. } => "domain_failure",
            ToolOutcome::TransientError(_) => "transient_error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "outcome": class,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        Ok(outcome)
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
