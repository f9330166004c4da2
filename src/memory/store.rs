//! MemoryStore：短期窗口 + 长期向量归档
//!
//! - append：写入短期窗口，溢出的最旧问答对交给 archive
//! - archive：嵌入 "User: .. Assistant: .." 后 upsert 到向量索引；失败只记日志，不回滚窗口
//! - recall：嵌入问题，按 session_id 过滤查询，返回最相近的一对
//!
//! 每个会话一把 tokio Mutex，只在窗口修改与归档 upsert 时持有；溢出问答对的嵌入在锁外完成，
//! 归档记录的 id / timestamp 在出窗时生成，反映出窗顺序。不同会话互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::core::{within, AgentError, Capability};
use crate::llm::Embedder;
use crate::memory::long_term::{ArchivedMemory, MemoryFilter, VectorIndex};
use crate::memory::{ShortTermWindow, Turn, TurnPair};

/// MemoryStore 行为参数
#[derive(Debug, Clone)]
pub struct MemoryStoreOptions {
    /// 短期窗口容量（消息条数，偶数）
    pub window_size: usize,
    /// recall 时向索引请求的条数
    pub retrieval_k: usize,
    /// 召回的最低相似度；None 表示不过滤
    pub min_recall_score: Option<f32>,
    pub embed_timeout: Duration,
    pub index_timeout: Duration,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            window_size: 6,
            retrieval_k: 1,
            min_recall_score: None,
            embed_timeout: Duration::from_secs(20),
            index_timeout: Duration::from_secs(20),
        }
    }
}

/// 单个会话的记忆统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub session_id: String,
    /// 短期窗口中的消息条数
    pub window_len: usize,
    /// 长期归档条数；索引不可达时为 None
    pub archived: Option<usize>,
}

type SessionWindow = Arc<Mutex<ShortTermWindow>>;

pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    sessions: RwLock<HashMap<String, SessionWindow>>,
    options: MemoryStoreOptions,
}

impl MemoryStore {
    /// 启动期校验：窗口必须为正偶数，Embedder 与索引维度必须一致
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        options: MemoryStoreOptions,
    ) -> Result<Self, AgentError> {
        if options.window_size == 0 || options.window_size % 2 != 0 {
            return Err(AgentError::config(format!(
                "memory.window_size must be a positive even number, got {}",
                options.window_size
            )));
        }
        if options.retrieval_k == 0 {
            return Err(AgentError::config("memory.retrieval_k must be at least 1"));
        }
        if embedder.dimension() == 0 || embedder.dimension() != index.dimension() {
            return Err(AgentError::config(format!(
                "embedder dimension {} does not match vector index dimension {}",
                embedder.dimension(),
                index.dimension()
            )));
        }
        Ok(Self {
            embedder,
            index,
            sessions: RwLock::new(HashMap::new()),
            options,
        })
    }

    pub fn options(&self) -> &MemoryStoreOptions {
        &self.options
    }

    async fn window(&self, session_id: &str) -> SessionWindow {
        if let Some(w) = self.sessions.read().await.get(session_id) {
            return w.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ShortTermWindow::new(self.options.window_size))))
            .clone()
    }

    /// 召回与问题最相近的归档问答对（仅限本会话）；无归档或召回失败时返回 None
    pub async fn recall(&self, session_id: &str, question: &str) -> Option<TurnPair> {
        let vector = match within(
            Capability::Embedder,
            self.options.embed_timeout,
            self.embedder.embed(question),
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "recall skipped: embedding failed");
                return None;
            }
        };

        let filter = MemoryFilter::session(session_id);
        let hits = match within(
            Capability::VectorIndex,
            self.options.index_timeout,
            self.index.query(&vector, &filter, self.options.retrieval_k),
        )
        .await
        {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "recall skipped: index query failed");
                return None;
            }
        };

        let best = hits
            .into_iter()
            .filter(|h| filter.matches(&h.memory))
            .find(|h| match self.options.min_recall_score {
                Some(min) => h.score >= min,
                None => true,
            })?;
        tracing::debug!(session_id, score = best.score, id = %best.memory.id, "memory recalled");
        Some(best.memory.to_pair())
    }

    /// 追加一问一答；窗口溢出时把最旧的问答对归档
    pub async fn append(&self, session_id: &str, user: Turn, agent: Turn) {
        let window = self.window(session_id).await;
        let evicted: Vec<(ArchivedMemory, String)> = {
            let mut window = window.lock().await;
            window
                .push_pair(TurnPair::new(user, agent))
                .iter()
                .map(|pair| (ArchivedMemory::new(session_id, pair, Vec::new()), pair.embedding_text()))
                .collect()
        };
        if evicted.is_empty() {
            return;
        }

        let mut ready = Vec::with_capacity(evicted.len());
        for (mut record, text) in evicted {
            match self.embed(&text).await {
                Ok(embedding) => {
                    record.embedding = embedding;
                    ready.push(record);
                }
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "archive failed, pair dropped from memory")
                }
            }
        }

        let _window = window.lock().await;
        for record in ready {
            if let Err(e) = self.upsert(session_id, record).await {
                tracing::warn!(session_id, error = %e, "archive failed, pair dropped from memory");
            }
        }
    }

    /// 归档一对问答到长期记忆；失败记录 warn 后丢弃
    pub async fn archive(&self, session_id: &str, user: Turn, agent: Turn) {
        let pair = TurnPair::new(user, agent);
        let result = match self.embed(&pair.embedding_text()).await {
            Ok(embedding) => {
                self.upsert(session_id, ArchivedMemory::new(session_id, &pair, embedding))
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(session_id, error = %e, "archive failed, pair dropped from memory");
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        within(
            Capability::Embedder,
            self.options.embed_timeout,
            self.embedder.embed(text),
        )
        .await
    }

    async fn upsert(&self, session_id: &str, record: ArchivedMemory) -> Result<(), AgentError> {
        let id = record.id.clone();
        within(
            Capability::VectorIndex,
            self.options.index_timeout,
            self.index.upsert(record),
        )
        .await?;
        tracing::info!(session_id, id = %id, "pair archived to long-term memory");
        Ok(())
    }

    /// 短期窗口快照（按时间顺序）；未知会话返回空
    pub async fn recent_turns(&self, session_id: &str) -> Vec<Turn> {
        let window = self.sessions.read().await.get(session_id).cloned();
        match window {
            Some(w) => w.lock().await.turns(),
            None => Vec::new(),
        }
    }

    pub async fn stats(&self, session_id: &str) -> MemoryStats {
        let window_len = match self.sessions.read().await.get(session_id).cloned() {
            Some(w) => w.lock().await.len(),
            None => 0,
        };
        let archived = match within(
            Capability::VectorIndex,
            self.options.index_timeout,
            self.index.count(&MemoryFilter::session(session_id)),
        )
        .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::debug!(session_id, error = %e, "archive count unavailable");
                None
            }
        };
        MemoryStats {
            session_id: session_id.to_string(),
            window_len,
            archived,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
