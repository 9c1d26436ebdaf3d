//! 检查点存储
//!
//! 会话状态按 thread_id 保存/恢复的最小契约；默认进程内实现，另提供每会话一个 JSON 文件的尽力而为实现。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::AgentError;
use crate::memory::Turn;

/// 一个会话的完整状态
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub thread_id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, thread_id: &str, state: &SessionState) -> Result<(), AgentError>;

    /// 未见过的 thread_id 返回 None
    async fn load(&self, thread_id: &str) -> Result<Option<SessionState>, AgentError>;

    /// 追加轮次；默认 load-push-save，调用方负责同一会话的串行化
    async fn append(&self, thread_id: &str, turns: Vec<Turn>) -> Result<(), AgentError> {
        let mut state = self
            .load(thread_id)
            .await?
            .unwrap_or_else(|| SessionState::new(thread_id));
        state.turns.extend(turns);
        state.updated_at = Utc::now();
        self.save(thread_id, &state).await
    }
}

/// 进程内检查点：进程退出即丢失
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<String, SessionState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, thread_id: &str, state: &SessionState) -> Result<(), AgentError> {
        self.states
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<SessionState>, AgentError> {
        Ok(self.states.read().await.get(thread_id).cloned())
    }

    /// 原地追加，不复制已有历史
    async fn append(&self, thread_id: &str, turns: Vec<Turn>) -> Result<(), AgentError> {
        let mut states = self.states.write().await;
        let state = states
            .entry(thread_id.to_string())
            .or_insert_with(|| SessionState::new(thread_id));
        state.turns.extend(turns);
        state.updated_at = Utc::now();
        Ok(())
    }
}

/// 文件检查点：dir/<thread_id>.json；目录不存在时自动创建
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        // thread_id 来自客户端，只保留安全字符，避免路径逃逸
        let safe: String = thread_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, thread_id: &str, state: &SessionState) -> Result<(), AgentError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AgentError::Checkpoint(e.to_string()))?;
        let data = serde_json::to_string_pretty(state)?;
        tokio::fs::write(self.path_for(thread_id), data)
            .await
            .map_err(|e| AgentError::Checkpoint(e.to_string()))
    }

    async fn load(&self, thread_id: &str) -> Result<Option<SessionState>, AgentError> {
        let path = self.path_for(thread_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::Checkpoint(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("sessions"));
        assert!(store.load("t1").await.unwrap().is_none());

        let mut state = SessionState::new("t1");
        state.turns.push(Turn::user("where is my order?"));
        store.save("t1", &state).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.thread_id, "t1");
        assert_eq!(loaded.turns, state.turns);
        assert_eq!(loaded.created_at, state.created_at);
        assert_eq!(loaded.updated_at, state.updated_at);
    }

    #[tokio::test]
    async fn test_file_store_append_uses_default_load_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.append("t1", vec![Turn::user("a")]).await.unwrap();
        store
            .append("t1", vec![Turn::agent("b"), Turn::user("c")])
            .await
            .unwrap();
        let loaded = store.load("t1").await.unwrap().unwrap();
        let contents: Vec<_> = loaded.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        assert!(loaded.updated_at >= loaded.created_at);
    }

    #[tokio::test]
    async fn test_in_memory_append_extends_in_place() {
        let store = InMemoryCheckpointStore::new();
        store.append("t", vec![Turn::user("one")]).await.unwrap();
        let before = store.load("t").await.unwrap().unwrap();
        store.append("t", vec![Turn::agent("two")]).await.unwrap();
        let after = store.load("t").await.unwrap().unwrap();
        assert_eq!(after.turns.len(), 2);
        assert_eq!(after.created_at, before.created_at);
        assert!(store.load("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store
            .save("../escape", &SessionState::new("../escape"))
            .await
            .unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }
}
