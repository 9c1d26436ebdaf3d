//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按声明顺序注册与查找，
//! ToolExecutor 在调用时加超时并把结果分类为 ToolOutcome。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::tools::ToolError;

/// 工具 trait：名称、描述（供推理服务理解）、参数 schema、异步执行（args 为 JSON）
///
/// 业务失败以 `Ok({"success": false, ...})` 正常返回；只有上游不稳定才返回 `Err(ToolError::Transient)`。
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// 暴露给推理服务的工具定义；启动后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 工具注册表：保留注册顺序，定义列表对推理服务稳定
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具替换旧实现（名称唯一）
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    pub fn to_schema_json(&self) -> String {
        serde_json::to_string_pretty(&self.definitions()).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_registration_order_and_replacement() {
        let mut reg = ToolRegistry::new();
        reg.register(Named("b", "first b"));
        reg.register(Named("a", "a"));
        reg.register(Named("b", "second b"));

        assert_eq!(reg.tool_names(), vec!["b", "a"]);
        assert_eq!(reg.len(), 2);
        let defs = reg.definitions();
        assert_eq!(defs[0].description, "second b");
        assert!(reg.contains("a"));
        assert!(reg.get("c").is_none());
    }
}
