//! 运行监管：每轮 run 的取消令牌
//!
//! 每次 run 从调用方令牌派生子令牌并按 trace_id 登记：调用方取消、按 trace_id / 会话取消、
//! 或进程退出时 cancel_all，任一发生都会触发。编排循环在状态之间的安全点检查并中止。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    root: CancellationToken,
    /// trace_id -> (session_id, token)
    active: Mutex<HashMap<String, (String, CancellationToken)>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, (String, CancellationToken)>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记一次 run，返回其取消令牌（caller 取消时同样触发）。同一 trace_id 重复登记返回已有令牌
    pub fn begin(&self, trace_id: &str, session_id: &str, caller: &CancellationToken) -> CancellationToken {
        let mut active = self.active();
        if let Some((_, token)) = active.get(trace_id) {
            return token.clone();
        }
        let token = caller.child_token();
        if self.root.is_cancelled() {
            token.cancel();
        }
        active.insert(trace_id.to_string(), (session_id.to_string(), token.clone()));
        token
    }

    /// run 结束（无论成功与否）后注销
    pub fn finish(&self, trace_id: &str) {
        self.active().remove(trace_id);
    }

    pub fn cancel(&self, trace_id: &str) -> bool {
        match self.active().get(trace_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消某会话下所有进行中的 run，返回取消数量
    pub fn cancel_session(&self, session_id: &str) -> usize {
        let active = self.active();
        let mut cancelled = 0;
        for (sid, token) in active.values() {
            if sid == session_id {
                token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// 取消所有进行中的 run；之后登记的 run 一开始即为已取消
    pub fn cancel_all(&self) {
        self.root.cancel();
        for (_, token) in self.active().values() {
            token.cancel();
        }
    }

    pub fn active_runs(&self) -> usize {
        self.active().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_session_only_touches_that_session() {
        let sup = SessionSupervisor::new();
        let none = CancellationToken::new();
        let a1 = sup.begin("t1", "a", &none);
        let a2 = sup.begin("t2", "a", &none);
        let b = sup.begin("t3", "b", &none);
        assert_eq!(sup.cancel_session("a"), 2);
        assert!(a1.is_cancelled() && a2.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[test]
    fn test_finish_unregisters() {
        let sup = SessionSupervisor::new();
        let none = CancellationToken::new();
        let _t = sup.begin("t1", "a", &none);
        assert_eq!(sup.active_runs(), 1);
        sup.finish("t1");
        assert_eq!(sup.active_runs(), 0);
        assert!(!sup.cancel("t1"));
    }

    #[test]
    fn test_cancel_all_propagates_to_children() {
        let sup = SessionSupervisor::new();
        let none = CancellationToken::new();
        let t = sup.begin("t1", "a", &none);
        sup.cancel_all();
        assert!(t.is_cancelled());
    }

    #[test]
    fn test_caller_token_cancels_run() {
        let sup = SessionSupervisor::new();
        let caller = CancellationToken::new();
        let t = sup.begin("t1", "a", &caller);
        assert!(!t.is_cancelled());
        caller.cancel();
        assert!(t.is_cancelled());
    }

    #[test]
    fn test_begin_twice_returns_registered_token() {
        let sup = SessionSupervisor::new();
        let first = sup.begin("t1", "a", &CancellationToken::new());
        assert!(sup.cancel("t1"));
        let second = sup.begin("t1", "a", &CancellationToken::new());
        assert!(second.is_cancelled());
        assert!(first.is_cancelled());
        assert_eq!(sup.active_runs(), 1);
    }

    #[test]
    fn test_begin_after_cancel_all_is_cancelled() {
        let sup = SessionSupervisor::new();
        sup.cancel_all();
        assert!(sup.begin("t1", "a", &CancellationToken::new()).is_cancelled());
    }
}
