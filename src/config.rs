//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ORDER_DESK__*` 覆盖（双下划线表示嵌套，如 `ORDER_DESK__APP__MAX_STEPS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub tools: ToolsSection,
    pub llm: LlmSection,
    pub session: SessionSection,
}

/// [app] 段：应用名、单次对话最大推理步数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 单次 run 内最多调用推理服务的次数，超出后优雅结束
    pub max_steps: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    10
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// [tools] 段：工具超时、随机种子、升级工单的人为延迟
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub timeout_secs: u64,
    /// 固定种子便于复现；未设置时使用系统熵
    pub seed: Option<u64>,
    pub escalation_delay_min_ms: u64,
    pub escalation_delay_max_ms: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            seed: None,
            escalation_delay_min_ms: 2000,
            escalation_delay_max_ms: 5000,
        }
    }
}

/// [llm] 段：推理服务后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// mock / openai
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// 覆盖内置 system prompt 的文件路径
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 60,
            system_prompt_path: None,
        }
    }
}

/// [session] 段：检查点存储后端（memory / file）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub store: String,
    pub dir: PathBuf,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            store: "memory".to_string(),
            dir: PathBuf::from("workspace/sessions"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ORDER_DESK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ORDER_DESK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ORDER_DESK")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_steps, 10);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.tools.escalation_delay_min_ms, 2000);
        assert_eq!(cfg.tools.escalation_delay_max_ms, 5000);
        assert_eq!(cfg.session.store, "memory");
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[app]\nmax_steps = 4\n\n[tools]\nseed = 7\nescalation_delay_min_ms = 10"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.max_steps, 4);
        assert_eq!(cfg.tools.seed, Some(7));
        assert_eq!(cfg.tools.escalation_delay_min_ms, 10);
        // 未出现的键保留默认值
        assert_eq!(cfg.tools.escalation_delay_max_ms, 5000);
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn test_env_overrides_file() {
        std::env::set_var("ORDER_DESK__LLM__MODEL", "gpt-env-override");
        let cfg = load_config(None).unwrap();
        std::env::remove_var("ORDER_DESK__LLM__MODEL");
        assert_eq!(cfg.llm.model, "gpt-env-override");
    }
}
