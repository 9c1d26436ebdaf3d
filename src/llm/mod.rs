//! 推理层：推理服务抽象与实现（OpenAI 兼容 / 规则 Mock / 脚本回放）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::{RuleBasedReasoner, ScriptedReasoner};
pub use openai::{OpenAiReasoner, TokenUsage, DEFAULT_SYSTEM_PROMPT};
pub use traits::{AgentStep, LlmError, ReasoningService};

use crate::config::AppConfig;
use crate::core::AgentError;

/// 根据配置选择推理服务；openai 后端需要 api_key_env 指向的环境变量
pub fn create_reasoner(cfg: &AppConfig) -> Result<Arc<dyn ReasoningService>, AgentError> {
    match cfg.llm.provider.to_lowercase().as_str() {
        "mock" | "rules" => {
            tracing::info!("Using rule-based reasoner");
            Ok(Arc::new(RuleBasedReasoner::new()))
        }
        "openai" => {
            let api_key = std::env::var(&cfg.llm.api_key_env).map_err(|_| {
                AgentError::ConfigError(format!("{} is not set", cfg.llm.api_key_env))
            })?;
            let mut reasoner = OpenAiReasoner::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                api_key,
                cfg.llm.request_timeout_secs,
            );
            if let Some(path) = &cfg.llm.system_prompt_path {
                let prompt = std::fs::read_to_string(path).map_err(|e| {
                    AgentError::ConfigError(format!("{}: {}", path.display(), e))
                })?;
                reasoner = reasoner.with_system_prompt(prompt);
            }
            tracing::info!("Using OpenAI-compatible reasoner ({})", cfg.llm.model);
            Ok(Arc::new(reasoner))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}
