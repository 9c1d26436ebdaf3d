//! 会话存储
//!
//! 以 thread_id 为键、只追加的会话状态；通过 CheckpointStore 保存/恢复。无淘汰策略，进程生命周期内无限增长。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;

use crate::core::AgentError;
use crate::memory::{CheckpointStore, InMemoryCheckpointStore, Turn};

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// 会话存储：append / history / reset
pub struct SessionStore {
    checkpoints: Arc<dyn CheckpointStore>,
    /// 每会话一把写锁：同一会话的追加串行，不同会话互不阻塞
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    issued: Mutex<HashSet<String>>,
}

impl SessionStore {
    pub fn new(checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            checkpoints,
            locks: Mutex::new(HashMap::new()),
            issued: Mutex::new(HashSet::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCheckpointStore::new()))
    }

    /// 追加一个轮次；未见过的 thread_id 隐式创建会话
    pub async fn append(&self, thread_id: &str, turn: Turn) -> Result<(), AgentError> {
        self.append_all(thread_id, vec![turn]).await
    }

    /// 一次写入多个轮次，要么全部可见要么都不可见
    pub async fn append_all(&self, thread_id: &str, turns: Vec<Turn>) -> Result<(), AgentError> {
        if turns.is_empty() {
            return Ok(());
        }
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().await;
        self.checkpoints.append(thread_id, turns).await
    }

    fn lock_for(&self, thread_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(thread_id.to_string()).or_default().clone()
    }

    /// 有序历史；未见过的 thread_id 返回空
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Turn>, AgentError> {
        Ok(self
            .checkpoints
            .load(thread_id)
            .await?
            .map(|s| s.turns)
            .unwrap_or_default())
    }

    /// 放弃当前会话归属，返回新的 thread_id；旧会话历史保留
    pub fn reset(&self, old: Option<&str>) -> String {
        let id = self.new_thread_id();
        if let Some(old) = old {
            tracing::info!(old = %old, new = %id, "session reset");
        }
        id
    }

    /// `session_<毫秒时间戳>_<9 位 base36 随机后缀>`；与本进程已发出的 id 冲突时重新生成
    pub fn new_thread_id(&self) -> String {
        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let id = format!(
                "session_{}_{}",
                chrono::Utc::now().timestamp_millis(),
                random_suffix()
            );
            if issued.insert(id.clone()) {
                return id;
            }
        }
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
