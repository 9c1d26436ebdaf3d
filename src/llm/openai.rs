//! OpenAI 兼容推理服务
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url），使用原生 tool calling；
//! 历史中的 agent / tool 轮次转为 assistant(tool_calls) / tool(tool_call_id) 消息。
//! 额外暴露一个 ask_customer 函数：模型调用它即表示需要人工输入。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{AgentStep, LlmError, ReasoningService};
use crate::memory::{Role, ToolCallRequest, Turn};
use crate::tools::ToolDefinition;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// 需要人工输入时模型调用的伪工具名（不在工具注册表内）
pub const ASK_CUSTOMER: &str = "ask_customer";

/// 默认 system prompt：重试策略只以自然语言告知模型，编排器本身不重试
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a customer support agent for an online store. \
Use the provided tools to look up, cancel, refund, replace or escalate orders. \
If a tool result starts with \"Error:\" the backend had a temporary failure: retry the same call up to two times, \
then apologise and offer to escalate to a human. \
If a tool returns \"success\": false, explain the returned message to the customer and do not retry. \
If you need information only the customer can give (such as an order number), call ask_customer with your question. \
Keep answers short and friendly.";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn get(&self) -> (u64, u64, u64) {
        let p = self.prompt_tokens.load(Ordering::Relaxed);
        let c = self.completion_tokens.load(Ordering::Relaxed);
        (p, c, p + c)
    }
}

/// OpenAI 兼容客户端：持有 Client、模型名、请求超时与 system prompt
pub struct OpenAiReasoner {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    system_prompt: String,
    pub usage: TokenUsage,
}

impl OpenAiReasoner {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/'))
            .with_api_key(api_key.into());
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    fn build_request(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()
                .map_err(invalid_request)?,
        )];
        for turn in history {
            messages.push(to_request_message(turn)?);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(invalid_request)?;

        // 函数定义按 wire 形状并入请求
        let mut body = serde_json::to_value(&request).map_err(invalid_request)?;
        body["tools"] = Value::Array(function_specs(tools));
        serde_json::from_value(body).map_err(invalid_request)
    }
}

fn invalid_request(e: impl std::fmt::Display) -> LlmError {
    LlmError::InvalidResponse(format!("cannot build request: {}", e))
}

fn from_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::ApiError(api) => LlmError::Api(api.message),
        other => LlmError::Http(other.to_string()),
    }
}

fn function_specs(tools: &[ToolDefinition]) -> Vec<Value> {
    let mut specs: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect();
    specs.push(json!({
        "type": "function",
        "function": {
            "name": ASK_CUSTOMER,
            "description": "Ask the customer a question and wait for their reply.",
            "parameters": {
                "type": "object",
                "properties": { "question": { "type": "string" } },
                "required": ["question"]
            }
        }
    }));
    specs
}

fn to_request_message(turn: &Turn) -> Result<ChatCompletionRequestMessage, LlmError> {
    let message = match turn.role {
        Role::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .map_err(invalid_request)?,
        ),
        // assistant 消息携带 tool_calls，由 wire JSON 反序列化得到
        Role::Agent => {
            let mut assistant = json!({ "role": "assistant" });
            if !turn.content.is_empty() {
                assistant["content"] = json!(turn.content);
            }
            if !turn.tool_calls.is_empty() {
                let calls: Vec<Value> = turn
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.args.to_string() }
                        })
                    })
                    .collect();
                assistant["tool_calls"] = Value::Array(calls);
            } else if turn.content.is_empty() {
                assistant["content"] = json!("");
            }
            serde_json::from_value(assistant).map_err(invalid_request)?
        }
        Role::Tool => ChatCompletionRequestMessage::Tool(
            ChatCompletionRequestToolMessageArgs::default()
                .content(turn.content.clone())
                .tool_call_id(turn.tool_call_id.clone().unwrap_or_default())
                .build()
                .map_err(invalid_request)?,
        ),
    };
    Ok(message)
}

/// 响应中的工具调用（wire 形状）
#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn parse_response(resp: CreateChatCompletionResponse) -> Result<AgentStep, LlmError> {
    let message = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices".to_string()))?
        .message;
    let calls: Vec<WireToolCall> = match message.tool_calls {
        Some(calls) => serde_json::to_value(calls)
            .and_then(serde_json::from_value)
            .map_err(|e| LlmError::InvalidResponse(format!("bad tool_calls: {}", e)))?,
        None => Vec::new(),
    };
    to_agent_step(message.content, calls)
}

/// 模型回复 → AgentStep；ask_customer 调用转为 awaiting_human
fn to_agent_step(content: Option<String>, calls: Vec<WireToolCall>) -> Result<AgentStep, LlmError> {
    let mut step = AgentStep {
        text: content.filter(|c| !c.trim().is_empty()),
        ..AgentStep::default()
    };
    for call in calls {
        let args: Value = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|e| {
                LlmError::InvalidResponse(format!("bad tool arguments for {}: {}", call.function.name, e))
            })?
        };
        if call.function.name == ASK_CUSTOMER {
            let question = args
                .get("question")
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(|| step.text.clone())
                .unwrap_or_else(|| "Could you tell me a bit more?".to_string());
            if !step.tool_calls.is_empty() {
                tracing::warn!(dropped = step.tool_calls.len(), "ask_customer issued alongside tool calls");
            }
            return Ok(AgentStep::ask_human(question));
        }
        step.tool_calls
            .push(ToolCallRequest::new(call.id, call.function.name, args));
    }
    Ok(step)
}

#[async_trait]
impl ReasoningService for OpenAiReasoner {
    async fn step(&self, history: &[Turn], tools: &[ToolDefinition]) -> Result<AgentStep, LlmError> {
        let request = self.build_request(history, tools)?;
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
            .map_err(from_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }
        parse_response(response)
    }
}
