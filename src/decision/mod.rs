//! 决策层：把生成式输出约束为严格的 Decision 变体
//!
//! - parser：从 LLM 文本中提取 JSON 并解析为 Decision
//! - prompt：决策 / 回答提示词
//! - schema：决策 JSON 的 Schema（拼入提示词）
//! - engine：DecisionEngine，负责超时、解析失败回退与能力约束

pub mod engine;
pub mod parser;
pub mod prompt;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{RetrievedDocument, Turn, TurnPair};
use crate::tools::ToolDescriptor;

pub use engine::DecisionEngine;
pub use parser::parse_decision;

/// 下一步动作；每次决策只激活一个变体
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Search { query: String },
    Retrieve,
    Tool { name: String, args: Value },
    Answer,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Search { .. } => "search",
            Decision::Retrieve => "retrieve",
            Decision::Tool { .. } => "tool",
            Decision::Answer => "answer",
        }
    }
}

/// 搜索与检索都可行时优先选择的能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Search,
    #[default]
    Retrieve,
}

/// 本次运行可用的信息获取能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub web_search: bool,
    pub retrieval: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            web_search: true,
            retrieval: true,
        }
    }
}

/// Generator 生成决策所需的只读输入
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub question: &'a str,
    pub context: &'a [String],
    pub documents: &'a [RetrievedDocument],
    pub recalled: Option<&'a TurnPair>,
    pub recent_turns: &'a [Turn],
    pub tools: &'a [ToolDescriptor],
    pub capabilities: Capabilities,
    pub prefer: Preference,
    /// 本轮已对问题执行过检索
    pub retrieval_attempted: bool,
}

/// Generator 生成最终回答所需的只读输入
#[derive(Debug, Clone, Copy)]
pub struct AnswerRequest<'a> {
    pub question: &'a str,
    pub context: &'a [String],
    pub documents: &'a [RetrievedDocument],
    pub recalled: Option<&'a TurnPair>,
    pub recent_turns: &'a [Turn],
    /// 已收集的来源（按首次出现顺序），要求回答内联引用
    pub sources: &'a [String],
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    pub sources: Vec<String>,
}
