//! 对话服务：启动时构造一次，作为共享状态注入 HTTP / 控制台入口
//!
//! 持有编排器与会话监管；`shutdown` 取消根 token，在途 run 在下一个挂起点停止。

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::config::AppConfig;
use crate::core::{AgentError, SessionSupervisor};
use crate::llm::{create_reasoner, ReasoningService};
use crate::memory::{
    CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, SessionStore, Turn,
};
use crate::react::Orchestrator;
use crate::tools::{order_desk_registry, Chaos, ToolDefinition, ToolExecutor};
use crate::transport::{into_frames, FrameStream};

/// 一次 chat 调用的结果：会话 id（新建时由服务分配）与帧流
pub struct ChatStream {
    pub session_id: String,
    /// 本次调用是否新分配了会话 id
    pub created: bool,
    pub frames: FrameStream,
}

pub struct ChatService {
    orchestrator: Arc<Orchestrator>,
    supervisor: SessionSupervisor,
}

impl ChatService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            supervisor: SessionSupervisor::new(),
        }
    }

    /// 按配置组装：工具（可选固定种子）、执行器、会话存储、推理服务
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let chaos = Arc::new(Chaos::new(cfg.tools.seed));
        let delay = escalation_delay(cfg);
        let registry = order_desk_registry(chaos, delay);
        let executor = Arc::new(ToolExecutor::with_timeout(
            registry,
            Duration::from_secs(cfg.tools.timeout_secs),
        ));

        let checkpoints: Arc<dyn CheckpointStore> = match cfg.session.store.as_str() {
            "memory" => Arc::new(InMemoryCheckpointStore::new()),
            "file" => Arc::new(FileCheckpointStore::new(&cfg.session.dir)),
            other => {
                return Err(AgentError::ConfigError(format!(
                    "unknown session store: {}",
                    other
                )))
            }
        };
        let store = Arc::new(SessionStore::new(checkpoints));
        let reasoner: Arc<dyn ReasoningService> = create_reasoner(cfg)?;

        tracing::info!(
            tools = executor.tool_names().len(),
            max_steps = cfg.app.max_steps,
            store = %cfg.session.store,
            "chat service ready"
        );
        Ok(Self::new(Arc::new(Orchestrator::new(
            store,
            executor,
            reasoner,
            cfg.app.max_steps,
        ))))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    /// 复用客户端给出的会话 id，缺省或为空时分配新 id；返回 (id, 是否新建)
    pub fn resolve_session(&self, session_id: Option<String>) -> (String, bool) {
        match session_id.filter(|s| !s.trim().is_empty()) {
            Some(id) => (id, false),
            None => (self.orchestrator.store().new_thread_id(), true),
        }
    }

    /// 校验消息后启动一次 run；空消息在任何副作用之前被拒绝
    pub fn chat(
        &self,
        session_id: Option<String>,
        message: &str,
    ) -> Result<ChatStream, AgentError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AgentError::EmptyMessage);
        }
        if self.supervisor.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let (session_id, created) = self.resolve_session(session_id);
        let guard = self.supervisor.begin_run();
        let events = self
            .orchestrator
            .run(session_id.clone(), message, guard.token());
        // guard 随帧流一起释放，在途计数覆盖整个流的生命周期
        let frames: FrameStream = Box::pin(into_frames(events).map(move |frame| {
            let _run = &guard;
            frame
        }));

        Ok(ChatStream {
            session_id,
            created,
            frames,
        })
    }

    pub fn reset(&self, old: Option<&str>) -> String {
        self.orchestrator.store().reset(old)
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, AgentError> {
        self.orchestrator.store().history(session_id).await
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.orchestrator.executor().definitions()
    }

    pub fn shutdown(&self) {
        tracing::info!(in_flight = self.supervisor.in_flight(), "chat service shutting down");
        self.supervisor.cancel();
    }
}

fn escalation_delay(cfg: &AppConfig) -> RangeInclusive<u64> {
    let min = cfg.tools.escalation_delay_min_ms;
    let max = cfg.tools.escalation_delay_max_ms.max(min);
    min..=max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AgentStep, ScriptedReasoner};
    use crate::transport::Frame;

    fn service(steps: Vec<AgentStep>) -> ChatService {
        let registry = order_desk_registry(Arc::new(Chaos::new(Some(1))), 0..=0);
        ChatService::new(Arc::new(Orchestrator::new(
            Arc::new(SessionStore::in_memory()),
            Arc::new(ToolExecutor::new(registry, 5)),
            Arc::new(ScriptedReasoner::new(steps)),
            10,
        )))
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_side_effects() {
        let svc = service(vec![]);
        let err = svc.chat(Some("s1".into()), "   \n").err().unwrap();
        assert!(err.is_client_error());
        assert!(svc.history("s1").await.unwrap().is_empty());
        assert_eq!(svc.supervisor().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_chat_assigns_session_and_ends_with_done() {
        let svc = service(vec![AgentStep::reply("Hello!")]);
        let chat = svc.chat(None, "hi").unwrap();
        assert!(chat.created);
        assert!(chat.session_id.starts_with("session_"));
        let frames: Vec<Frame> = chat.frames.collect().await;
        assert_eq!(frames.last(), Some(&Frame::Done));
        assert_eq!(svc.history(&chat.session_id).await.unwrap().len(), 2);
        assert_eq!(svc.supervisor().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_runs() {
        let svc = service(vec![AgentStep::reply("Hello!")]);
        svc.shutdown();
        assert!(matches!(svc.chat(None, "hi"), Err(AgentError::Cancelled)));
    }

    #[test]
    fn test_from_config_with_defaults() {
        let svc = ChatService::from_config(&AppConfig::default()).unwrap();
        let names: Vec<String> = svc.tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"cancel_order".to_string()));
    }
}
