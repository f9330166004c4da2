//! 知识库检索（RAG）
//!
//! KnowledgeRetriever：向量 -> 按相似度排序的文档块。LocalKnowledgeBase 从预先构建好的 JSON 文件加载
//! `{text, source, embedding}` 块并做余弦 top-k；索引构建不在本 crate 内。

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, Capability};

/// 检索到的文档块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub source: String,
    pub score: f32,
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn query(&self, vector: &[f32], top_k: usize)
        -> Result<Vec<RetrievedDocument>, AgentError>;
}

/// 知识库中的一块（JSON 文件中的一项）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub text: String,
    pub source: String,
    pub embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    items: Vec<KnowledgeChunk>,
}

/// 内存知识库
#[derive(Debug, Clone, Default)]
pub struct LocalKnowledgeBase {
    chunks: Vec<KnowledgeChunk>,
    dimension: usize,
}

impl LocalKnowledgeBase {
    /// 所有块的向量维度必须一致
    pub fn from_chunks(chunks: Vec<KnowledgeChunk>) -> Result<Self, AgentError> {
        let dimension = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimension) {
            return Err(AgentError::config(format!(
                "knowledge chunk from {} has dimension {}, expected {}",
                bad.source,
                bad.embedding.len(),
                dimension
            )));
        }
        Ok(Self { chunks, dimension })
    }

    /// 从 JSON 文件加载：`{"items": [{"text", "source", "embedding"}, ...]}`
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::config(format!("read knowledge base {}: {}", path.display(), e))
        })?;
        let file: KnowledgeFile = serde_json::from_str(&raw).map_err(|e| {
            AgentError::config(format!("parse knowledge base {}: {}", path.display(), e))
        })?;
        let kb = Self::from_chunks(file.items)?;
        tracing::info!(path = %path.display(), chunks = kb.len(), "knowledge base loaded");
        Ok(kb)
    }

    /// 向量维度（空知识库为 0）
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl KnowledgeRetriever for LocalKnowledgeBase {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>, AgentError> {
        if self.chunks.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension {
            return Err(AgentError::failure(
                Capability::KnowledgeRetriever,
                format!(
                    "query dimension {} does not match index dimension {}",
                    vector.len(),
                    self.dimension
                ),
            ));
        }
        let mut scored: Vec<(f32, &KnowledgeChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(vector, &chunk.embedding), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| RetrievedDocument {
                text: chunk.text.clone(),
                source: chunk.source.clone(),
                score,
            })
            .collect())
    }
}

/// 余弦相似度
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
