//! 会话监管：服务生命周期与请求级中断
//!
//! 根 CancellationToken 随服务关闭而取消；每个 run 持有子 token，客户端断开或服务关闭时在下一个挂起点退出。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// 服务级生命周期管理：根取消令牌与在途 run 计数
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
    in_flight: Arc<AtomicUsize>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 触发关闭：所有子 token 一并取消
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 为单个 run 创建子 token，并登记在途数；guard 释放时自动减一
    pub fn begin_run(&self) -> RunGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        RunGuard {
            token: self.cancel_token.child_token(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// 当前仍在执行的 run 数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 单个 run 的取消令牌与在途计数守卫
#[derive(Debug)]
pub struct RunGuard {
    token: CancellationToken,
    in_flight: Arc<AtomicUsize>,
}

impl RunGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_token_cancelled_with_root() {
        let sup = SessionSupervisor::new();
        let guard = sup.begin_run();
        assert_eq!(sup.in_flight(), 1);
        assert!(!guard.token().is_cancelled());
        sup.cancel();
        assert!(guard.token().is_cancelled());
        drop(guard);
        assert_eq!(sup.in_flight(), 0);
    }
}
