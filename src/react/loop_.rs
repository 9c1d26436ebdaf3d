//! 编排主循环
//!
//! 用户消息写入会话 -> 推理（完整历史 + 工具定义）-> 执行工具并写回 tool 轮次 -> 下一轮推理，
//! 直到得到最终回复、需要人工输入或达到最大步数。每一步产出的轮次以 RawEvent 按顺序推送到有界通道。
//! 编排器不重试工具：瞬时错误如实写回历史，由推理服务决定是否重发。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::ReasoningService;
use crate::memory::{SessionStore, Turn};
use crate::react::RawEvent;
use crate::tools::{ToolExecutor, ToolOutcome};

/// 默认最大推理步数
pub const DEFAULT_MAX_STEPS: usize = 10;
/// 事件通道容量：消费端（传输层）变慢时反压编排任务
const CHANNEL_CAPACITY: usize = 16;

/// 一次 run 的事件流：有序、有限；故障以唯一一条 Err 结尾
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RawEvent, AgentError>> + Send>>;

enum RunMessage {
    Event(RawEvent),
    Failed(AgentError),
    Finished,
}

/// 编排器：跨调用只持有会话存储、工具执行器与推理服务的引用
pub struct Orchestrator {
    store: Arc<SessionStore>,
    executor: Arc<ToolExecutor>,
    reasoner: Arc<dyn ReasoningService>,
    max_steps: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        executor: Arc<ToolExecutor>,
        reasoner: Arc<dyn ReasoningService>,
        max_steps: usize,
    ) -> Self {
        Self {
            store,
            executor,
            reasoner,
            max_steps: max_steps.max(1),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// 启动一次 run：后台任务驱动编排，返回按产生顺序排列的事件流。
    /// 流被丢弃（客户端断开）或 cancel 触发后，任务在下一个挂起点退出；进行中的工具调用不会被强行打断。
    pub fn run(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        message: impl Into<String>,
        cancel: CancellationToken,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let this = Arc::clone(self);
        let thread_id = thread_id.into();
        let message = message.into();

        tokio::spawn(async move {
            let emitter = Emitter { tx, cancel };
            tracing::info!(thread_id = %thread_id, "run started");
            match this.drive(&thread_id, &message, &emitter).await {
                Ok(steps) => {
                    tracing::info!(thread_id = %thread_id, steps, "run finished");
                    let _ = emitter.tx.send(RunMessage::Finished).await;
                }
                Err(AgentError::Cancelled) => {
                    tracing::debug!(thread_id = %thread_id, "run abandoned (client gone or shutdown)");
                    let _ = emitter.tx.send(RunMessage::Failed(AgentError::Cancelled)).await;
                }
                Err(e) => {
                    tracing::error!(thread_id = %thread_id, error = %e, "run failed");
                    let _ = emitter.tx.send(RunMessage::Failed(e)).await;
                }
            }
        });

        Box::pin(stream::unfold(Some(rx), |state| async move {
            let mut rx = state?;
            match rx.recv().await {
                Some(RunMessage::Event(ev)) => Some((Ok(ev), Some(rx))),
                Some(RunMessage::Failed(e)) => Some((Err(e), None)),
                Some(RunMessage::Finished) => None,
                // 任务未留下终止标记就退出（如 panic）
                None => Some((
                    Err(AgentError::Internal(
                        "orchestration task ended unexpectedly".to_string(),
                    )),
                    None,
                )),
            }
        }))
    }

    /// 返回实际使用的推理步数
    async fn drive(
        &self,
        thread_id: &str,
        message: &str,
        emitter: &Emitter,
    ) -> Result<usize, AgentError> {
        self.store.append(thread_id, Turn::user(message)).await?;
        let tools = self.executor.definitions();

        for step in 1..=self.max_steps {
            emitter.check()?;
            let history = self.store.history(thread_id).await?;
            let decision = emitter
                .interruptible(self.reasoner.step(&history, &tools))
                .await??;

            if decision.awaiting_human {
                if decision.has_tool_calls() {
                    tracing::warn!(
                        thread_id = %thread_id,
                        dropped = decision.tool_calls.len(),
                        "followup requested alongside tool calls; calls dropped"
                    );
                }
                let turn = Turn::agent(decision.text.unwrap_or_default());
                self.store.append(thread_id, turn.clone()).await?;
                emitter.emit(RawEvent::Followup { turns: vec![turn] }).await?;
                return Ok(step);
            }

            if decision.has_tool_calls() {
                if let Some(unknown) = decision
                    .tool_calls
                    .iter()
                    .find(|c| !self.executor.contains(&c.name))
                {
                    return Err(AgentError::HallucinatedTool(unknown.name.clone()));
                }

                let calls = decision.tool_calls;
                let agent_turn =
                    Turn::agent_with_calls(decision.text.unwrap_or_default(), calls.clone());
                emitter
                    .emit(RawEvent::Agent { turns: vec![agent_turn.clone()] })
                    .await?;

                // 同一步的调用并发执行且不可中断；agent 轮次与全部结果一次写入，
                // 历史中不会出现缺少结果的 tool_call
                let outcomes = join_all(
                    calls
                        .iter()
                        .map(|c| self.executor.invoke(&c.name, c.args.clone())),
                )
                .await;
                let tool_turns: Vec<Turn> = calls
                    .iter()
                    .zip(outcomes)
                    .map(|(call, outcome)| {
                        let outcome = outcome.unwrap_or_else(|e| {
                            tracing::warn!(tool = %call.name, error = %e, "tool invocation failed");
                            ToolOutcome::TransientError(e.to_string())
                        });
                        Turn::tool(call, &outcome)
                    })
                    .collect();

                let mut step_turns = Vec::with_capacity(tool_turns.len() + 1);
                step_turns.push(agent_turn);
                step_turns.extend(tool_turns.iter().cloned());
                self.store.append_all(thread_id, step_turns).await?;

                // 按发出顺序上报
                for turn in tool_turns {
                    emitter.emit(RawEvent::Tool { turns: vec![turn] }).await?;
                }
                continue;
            }

            let turn = Turn::agent(decision.text.unwrap_or_default());
            self.store.append(thread_id, turn.clone()).await?;
            emitter.emit(RawEvent::Agent { turns: vec![turn] }).await?;
            return Ok(step);
        }

        tracing::warn!(thread_id = %thread_id, max_steps = self.max_steps, "step limit reached");
        let turn = Turn::agent(step_limit_message(self.max_steps));
        self.store.append(thread_id, turn.clone()).await?;
        emitter.emit(RawEvent::Agent { turns: vec![turn] }).await?;
        Ok(self.max_steps)
    }
}

/// 达到步数上限时写给用户的说明
pub fn step_limit_message(max_steps: usize) -> String {
    format!(
        "I wasn't able to finish this request within {} steps, so I've stopped here. \
         Please try rephrasing, or ask me to connect you with a human agent.",
        max_steps
    )
}

struct Emitter {
    tx: mpsc::Sender<RunMessage>,
    cancel: CancellationToken,
}

impl Emitter {
    fn check(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() || self.tx.is_closed() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn emit(&self, event: RawEvent) -> Result<(), AgentError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            sent = self.tx.send(RunMessage::Event(event)) => sent.map_err(|_| AgentError::Cancelled),
        }
    }

    /// 推理调用可被取消：客户端断开或服务关闭时不再等待结果
    async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, AgentError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            _ = self.tx.closed() => Err(AgentError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AgentStep, ScriptedReasoner};
    use crate::memory::{Role, ToolCallRequest};
    use crate::tools::{order_desk_registry, Chaos};
    use futures_util::StreamExt;
    use serde_json::json;

    fn orchestrator(reasoner: Arc<ScriptedReasoner>, max_steps: usize) -> Arc<Orchestrator> {
        let registry = order_desk_registry(Arc::new(Chaos::new(Some(11))), 0..=0);
        Arc::new(Orchestrator::new(
            Arc::new(SessionStore::in_memory()),
            Arc::new(ToolExecutor::new(registry, 5)),
            reasoner,
            max_steps,
        ))
    }

    async fn collect(stream: EventStream) -> Vec<Result<RawEvent, AgentError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_tool_results_reported_in_issue_order() {
        let calls = vec![
            ToolCallRequest::new("c1", "get_order_status", json!({"orderId": "A1"})),
            ToolCallRequest::new("c2", "cancel_order", json!({"orderId": "B2"})),
        ];
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            AgentStep::calls(calls),
            AgentStep::reply("done"),
        ]));
        let orch = orchestrator(Arc::clone(&reasoner), 10);
        let events = collect(orch.run("t", "check A1 and cancel B2", CancellationToken::new())).await;

        let kinds: Vec<_> = events.iter().map(|e| e.as_ref().unwrap().kind()).collect();
        assert_eq!(kinds, vec!["agent_event", "tool_event", "tool_event", "agent_event"]);
        let tool_names: Vec<_> = events[1..3]
            .iter()
            .map(|e| e.as_ref().unwrap().turns()[0].tool_name.clone().unwrap())
            .collect();
        assert_eq!(tool_names, vec!["get_order_status", "cancel_order"]);

        let history = orch.store().history("t").await.unwrap();
        let roles: Vec<_> = history.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Agent, Role::Tool, Role::Tool, Role::Agent]
        );
    }

    #[tokio::test]
    async fn test_step_limit_ends_gracefully() {
        let call = ToolCallRequest::new("c", "get_order_status", json!({"orderId": "A1"}));
        let reasoner = Arc::new(ScriptedReasoner::new(
            (0..5).map(|_| AgentStep::calls(vec![call.clone()])),
        ));
        let orch = orchestrator(Arc::clone(&reasoner), 2);
        let events = collect(orch.run("t", "loop forever", CancellationToken::new())).await;

        assert!(events.iter().all(|e| e.is_ok()));
        let last = events.last().unwrap().as_ref().unwrap();
        assert_eq!(last.turns()[0].content, step_limit_message(2));
        assert_eq!(reasoner.histories().len(), 2);
    }

    #[tokio::test]
    async fn test_followup_stops_run() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![AgentStep::ask_human(
            "Which order?",
        )]));
        let orch = orchestrator(reasoner, 10);
        let events = collect(orch.run("t", "cancel my order", CancellationToken::new())).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(RawEvent::Followup { .. })));
    }

    #[tokio::test]
    async fn test_followup_with_calls_runs_no_tools() {
        let mut step = AgentStep::ask_human("Which order?");
        step.tool_calls = vec![ToolCallRequest::new(
            "c",
            "cancel_order",
            json!({"orderId": "B2"}),
        )];
        let reasoner = Arc::new(ScriptedReasoner::new(vec![step]));
        let orch = orchestrator(reasoner, 10);
        let events = collect(orch.run("t", "cancel it", CancellationToken::new())).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(RawEvent::Followup { .. })));
        let history = orch.store().history("t").await.unwrap();
        assert!(history.iter().all(|t| t.role != Role::Tool));
        // 追问轮次不携带未执行的调用
        assert!(history.iter().all(|t| t.tool_calls.is_empty()));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_terminal_error() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![AgentStep::calls(vec![
            ToolCallRequest::new("c", "launch_rocket", json!({})),
        ])]));
        let orch = orchestrator(reasoner, 10);
        let events = collect(orch.run("t", "hi", CancellationToken::new())).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Err(AgentError::HallucinatedTool(n)) if n == "launch_rocket"));
        // 未知工具不会留下 tool 轮次
        let history = orch.store().history("t").await.unwrap();
        assert!(history.iter().all(|t| t.role != Role::Tool));
    }

    #[tokio::test]
    async fn test_reasoning_outage_is_single_error() {
        let reasoner = Arc::new(ScriptedReasoner::default());
        let orch = orchestrator(reasoner, 10);
        let events = collect(orch.run("t", "hi", CancellationToken::new())).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(AgentError::LlmError(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![AgentStep::reply("hi")]));
        let orch = orchestrator(Arc::clone(&reasoner), 10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = collect(orch.run("t", "hi", cancel)).await;
        assert!(matches!(events.as_slice(), [Err(AgentError::Cancelled)]));
        assert!(reasoner.histories().is_empty());
    }
}
