//! Pinecone 向量索引（REST 数据面）
//!
//! upsert -> POST {host}/vectors/upsert；query -> POST {host}/query（带 session_id + type 元数据过滤）。
//! 元数据中的消息截断到 1000 字符；查询不取回向量，召回结果的 embedding 为空。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::{AgentError, Capability};
use crate::memory::long_term::{ArchivedMemory, MemoryFilter, ScoredMemory, VectorIndex, MEMORY_RECORD_TYPE};

const METADATA_TEXT_LIMIT: usize = 1000;
const API_VERSION: &str = "2024-07";

pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    namespace: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct StatsResponse {
    #[serde(default, rename = "totalVectorCount")]
    total_vector_count: usize,
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl PineconeIndex {
    /// host 为索引数据面地址（如 https://mainagent-memory-xxxx.svc.us-east-1.pinecone.io）
    pub fn new(
        host: &str,
        api_key: &str,
        namespace: Option<&str>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        if api_key.trim().is_empty() {
            return Err(AgentError::config("PINECONE_API_KEY is empty"));
        }
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(AgentError::config("memory.pinecone.host is not set"));
        }
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::config(format!("pinecone client: {e}")))?;
        Ok(Self {
            client,
            host,
            api_key: api_key.to_string(),
            namespace: namespace.unwrap_or_default().to_string(),
            dimension,
        })
    }

    fn filter_json(filter: &MemoryFilter) -> Value {
        json!({
            "session_id": { "$eq": filter.session_id },
            "type": { "$eq": MEMORY_RECORD_TYPE },
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<reqwest::Response, AgentError> {
        let resp = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::failure(Capability::VectorIndex, format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::failure(
                Capability::VectorIndex,
                format!("HTTP {status}: {}", truncate_chars(&text, 200)),
            ));
        }
        Ok(resp)
    }

    fn memory_from_match(m: QueryMatch) -> Option<ScoredMemory> {
        let meta = m.metadata?;
        let text = |key: &str| {
            meta.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Some(ScoredMemory {
            score: m.score,
            memory: ArchivedMemory {
                id: m.id,
                session_id: text("session_id"),
                user_message: text("user_message"),
                assistant_message: text("assistant_message"),
                embedding: Vec::new(),
                timestamp: meta.get("timestamp").and_then(|v| v.as_i64()).unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
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
        let body = json!({
            "namespace": self.namespace,
            "vectors": [{
                "id": record.id,
                "values": record.embedding,
                "metadata": {
                    "session_id": record.session_id,
                    "user_message": truncate_chars(&record.user_message, METADATA_TEXT_LIMIT),
                    "assistant_message": truncate_chars(&record.assistant_message, METADATA_TEXT_LIMIT),
                    "timestamp": record.timestamp,
                    "type": MEMORY_RECORD_TYPE,
                }
            }]
        });
        self.post("/vectors/upsert", body).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredMemory>, AgentError> {
        let body = json!({
            "namespace": self.namespace,
            "vector": vector,
            "topK": top_k,
            "filter": Self::filter_json(filter),
            "includeValues": false,
            "includeMetadata": true,
        });
        let resp: QueryResponse = self
            .post("/query", body)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::failure(Capability::VectorIndex, format!("decode query: {e}")))?;
        Ok(resp
            .matches
            .into_iter()
            .filter_map(Self::memory_from_match)
            // 远端过滤之外再校验一次，保证会话隔离
            .filter(|m| filter.matches(&m.memory))
            .collect())
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize, AgentError> {
        let body = json!({ "filter": Self::filter_json(filter) });
        let stats: StatsResponse = self
            .post("/describe_index_stats", body)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::failure(Capability::VectorIndex, format!("decode stats: {e}")))?;
        Ok(stats.total_vector_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_credentials() {
        let err = PineconeIndex::new("host", "", None, 1536, Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::ConfigurationError(_)));
        let err = PineconeIndex::new("", "key", None, 1536, Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::ConfigurationError(_)));
    }

    #[test]
    fn test_host_gets_scheme() {
        let index =
            PineconeIndex::new("idx.pinecone.io/", "key", None, 8, Duration::from_secs(5)).unwrap();
        assert_eq!(index.host, "https://idx.pinecone.io");
    }

    #[test]
    fn test_match_metadata_mapping() {
        let m = QueryMatch {
            id: "s1_1".to_string(),
            score: 0.9,
            metadata: Some(json!({
                "session_id": "s1",
                "user_message": "q",
                "assistant_message": "a",
                "timestamp": 42,
                "type": MEMORY_RECORD_TYPE,
            })),
        };
        let scored = PineconeIndex::memory_from_match(m).unwrap();
        assert_eq!(scored.memory.session_id, "s1");
        assert_eq!(scored.memory.timestamp, 42);
        assert!(scored.memory.embedding.is_empty());
    }

    #[test]
    fn test_filter_json_scopes_session_and_type() {
        let f = PineconeIndex::filter_json(&MemoryFilter::session("abc"));
        assert_eq!(f["session_id"]["$eq"], "abc");
        assert_eq!(f["type"]["$eq"], MEMORY_RECORD_TYPE);
    }
}
