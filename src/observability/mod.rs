//! 可观测性：tracing 订阅器初始化与最近运行的评估记录

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 评估记录保留条数
pub const EVAL_LOG_CAPACITY: usize = 50;

/// 初始化全局订阅器；RUST_LOG 未设置时默认 info。重复调用不会 panic
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// 单次运行的评估数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalEntry {
    pub session_id: String,
    pub trace_id: String,
    pub latency_ms: u64,
    pub searches: u32,
    pub rag_hits: u32,
    pub tool_calls: u32,
    pub degraded: bool,
    pub ok: bool,
    /// RFC 3339
    pub at: String,
}

/// 固定容量的环形缓冲，超出时丢弃最旧记录
#[derive(Debug)]
pub struct EvalLog {
    entries: Mutex<VecDeque<EvalEntry>>,
    capacity: usize,
}

impl Default for EvalLog {
    fn default() -> Self {
        Self::with_capacity(EVAL_LOG_CAPACITY)
    }
}

impl EvalLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, entry: EvalEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// 按时间顺序（旧 -> 新）
    pub fn snapshot(&self) -> Vec<EvalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
