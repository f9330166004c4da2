//! 长期记忆：归档的问答对 + 向量索引
//!
//! 所有会话共用一个物理索引，按 session_id 元数据过滤实现隔离。
//! InMemoryVectorIndex 供测试与离线运行；远端实现见 pinecone.rs。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::{AgentError, Capability};
use crate::memory::rag::cosine_similarity;
use crate::memory::{Turn, TurnPair};

/// 归档记录的类型标记（与其它向量共存于同一索引时用于过滤）
pub const MEMORY_RECORD_TYPE: &str = "conversation_memory";

/// 归档后的问答对，写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedMemory {
    pub id: String,
    pub session_id: String,
    pub user_message: String,
    pub assistant_message: String,
    pub embedding: Vec<f32>,
    /// Unix 秒
    pub timestamp: i64,
}

impl ArchivedMemory {
    pub fn new(session_id: &str, pair: &TurnPair, embedding: Vec<f32>) -> Self {
        let now = chrono::Utc::now();
        // 同一毫秒内可能归档多对，追加随机后缀避免覆盖
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}_{}_{}", session_id, now.timestamp_millis(), &suffix[..8]),
            session_id: session_id.to_string(),
            user_message: pair.user.text().to_string(),
            assistant_message: pair.agent.text().to_string(),
            embedding,
            timestamp: now.timestamp(),
        }
    }

    pub fn to_pair(&self) -> TurnPair {
        TurnPair::new(
            Turn::user(self.user_message.clone()),
            Turn::agent(self.assistant_message.clone(), Vec::new()),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub memory: ArchivedMemory,
    pub score: f32,
}

/// 查询过滤条件：仅限某会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFilter {
    pub session_id: String,
}

impl MemoryFilter {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    pub fn matches(&self, memory: &ArchivedMemory) -> bool {
        memory.session_id == self.session_id
    }
}

/// 向量索引：upsert 与按过滤条件的近邻查询
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 索引的向量维度，必须与 Embedder 输出一致
    fn dimension(&self) -> usize;

    async fn upsert(&self, record: ArchivedMemory) -> Result<(), AgentError>;

    /// 按相似度降序返回最多 top_k 条满足 filter 的记录
    async fn query(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredMemory>, AgentError>;

    /// 满足 filter 的记录数
    async fn count(&self, filter: &MemoryFilter) -> Result<usize, AgentError>;
}

/// 内存向量索引
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    dimension: usize,
    records: RwLock<Vec<ArchivedMemory>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }

    /// 某会话的全部归档（按写入顺序）
    pub async fn records_for(&self, session_id: &str) -> Vec<ArchivedMemory> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, record: ArchivedMemory) -> Result<(), AgentError> {
        if record.embedding.len() != self.dimension {
            return Err(AgentError::failure(
                Capability::VectorIndex,
                format!(
                    "vector dimension {} does not match index dimension {}",
                    record.embedding.len(),
                    self.dimension
                ),
            ));
        }
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredMemory>, AgentError> {
        let records = self.records.read().await;
        let mut scored: Vec<ScoredMemory> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| ScoredMemory {
                score: cosine_similarity(vector, &r.embedding),
                memory: r.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize, AgentError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| filter.matches(r))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, session: &str, embedding: Vec<f32>) -> ArchivedMemory {
        ArchivedMemory {
            id: id.to_string(),
            session_id: session.to_string(),
            user_message: format!("user {id}"),
            assistant_message: format!("assistant {id}"),
            embedding,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_query_respects_session_filter() {
        let index = InMemoryVectorIndex::new(2);
        index.upsert(record("a1", "a", vec![0.0, 1.0])).await.unwrap();
        index.upsert(record("b1", "b", vec![1.0, 0.0])).await.unwrap();

        let hits = index
            .query(&[1.0, 0.0], &MemoryFilter::session("a"), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, "a1");
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let index = InMemoryVectorIndex::new(3);
        let err = index.upsert(record("x", "a", vec![1.0])).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderFailure { capability: Capability::VectorIndex, .. }
        ));
        assert_eq!(index.len().await, 0);
    }

    #[tokio::test]
    async fn test_upsert_same_id_replaces() {
        let index = InMemoryVectorIndex::new(2);
        index.upsert(record("x", "a", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("x", "a", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.count(&MemoryFilter::session("a")).await.unwrap(), 1);
    }

    #[test]
    fn test_archived_memory_from_pair() {
        let pair = TurnPair::new(Turn::user("hi"), Turn::agent("hello", vec![]));
        let mem = ArchivedMemory::new("s1", &pair, vec![0.1]);
        assert!(mem.id.starts_with("s1_"));
        assert_eq!(mem.to_pair(), pair);
    }
}
