//! 单轮编排的工作状态
//!
//! ConversationState 由一次 run 独占，按值在状态机各步骤之间以 &mut 传递；
//! 上下文片段、检索文档、来源只追加不删除。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{RetrievedDocument, Turn, TurnPair};

/// 状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Deciding,
    Searching,
    Retrieving,
    Invoking,
    Answering,
    Done,
}

/// 单轮指标
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// 执行过的 Searching 步数（含失败的尝试）
    pub search_count: u32,
    /// 检索返回的文档总数
    pub rag_hits: u32,
    /// 执行过的 Invoking 步数
    pub tool_calls: u32,
    /// Decision Engine 调用次数
    pub decisions: u32,
}

/// 待执行的工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: Value,
}

#[derive(Clone, Debug)]
pub struct ConversationState {
    pub question: String,
    pub accumulated_context: Vec<String>,
    pub recalled_memory: Option<TurnPair>,
    /// 短期窗口快照（按时间顺序），只读
    pub recent_turns: Vec<Turn>,
    pub retrieved_documents: Vec<RetrievedDocument>,
    pub pending_tool_call: Option<ToolCallRequest>,
    pub metrics: RunMetrics,
    pub answer: Option<String>,
    /// 本轮已针对问题执行过检索（再次 Retrieve 不会带来新信息）
    pub retrieval_attempted: bool,
    sources: Vec<String>,
}

impl ConversationState {
    pub fn new(
        question: impl Into<String>,
        recalled_memory: Option<TurnPair>,
        recent_turns: Vec<Turn>,
    ) -> Self {
        Self {
            question: question.into(),
            accumulated_context: Vec::new(),
            recalled_memory,
            recent_turns,
            retrieved_documents: Vec::new(),
            pending_tool_call: None,
            metrics: RunMetrics::default(),
            answer: None,
            retrieval_attempted: false,
            sources: Vec::new(),
        }
    }

    pub fn push_context(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.trim().is_empty() {
            self.accumulated_context.push(fragment);
        }
    }

    /// 记录来源（保持首次出现顺序，去重）
    pub fn add_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if source.trim().is_empty() || self.sources.contains(&source) {
            return;
        }
        self.sources.push(source);
    }

    pub fn add_documents(&mut self, documents: Vec<RetrievedDocument>) {
        for doc in documents {
            self.push_context(format!("Source: {}\nExcerpt: {}", doc.source, doc.text));
            self.add_source(doc.source.clone());
            self.retrieved_documents.push(doc);
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str, source: &str) -> RetrievedDocument {
        RetrievedDocument {
            text: text.to_string(),
            source: source.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_context_accumulates_in_order() {
        let mut state = ConversationState::new("q", None, Vec::new());
        state.push_context("first");
        state.push_context("   ");
        state.push_context("second");
        assert_eq!(state.accumulated_context, vec!["first", "second"]);
    }

    #[test]
    fn test_sources_deduplicated_in_first_seen_order() {
        let mut state = ConversationState::new("q", None, Vec::new());
        state.add_documents(vec![doc("a", "b.md"), doc("b", "a.md"), doc("c", "b.md")]);
        state.add_source("https://example.com");
        assert_eq!(state.sources(), ["b.md", "a.md", "https://example.com"]);
        assert_eq!(state.retrieved_documents.len(), 3);
        assert!(state.accumulated_context[0].starts_with("Source: b.md"));
    }
}
