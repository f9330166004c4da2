//! 短期记忆：最近的对话轮次
//!
//! 按时间顺序保留最近的 user/agent 消息对，容量以消息条数计（必须为偶数）；
//! 超出时从最旧的一端成对弹出，交由 MemoryStore 归档到长期记忆。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 发往 LLM 的单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 对话轮次的发言方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

/// 一次发言，创建后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Speaker,
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sources: Vec<String>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn agent(text: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role: Speaker::Agent,
            text: text.into(),
            sources,
        }
    }

    pub fn role(&self) -> Speaker {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

/// 一问一答
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnPair {
    pub user: Turn,
    pub agent: Turn,
}

impl TurnPair {
    pub fn new(user: Turn, agent: Turn) -> Self {
        Self { user, agent }
    }

    /// 归档时用于生成向量的文本
    pub fn embedding_text(&self) -> String {
        format!("User: {} Assistant: {}", self.user.text(), self.agent.text())
    }
}

/// 短期窗口：最多 capacity 条消息，按时间顺序
#[derive(Clone, Debug)]
pub struct ShortTermWindow {
    pairs: VecDeque<TurnPair>,
    capacity: usize,
}

impl ShortTermWindow {
    /// capacity 为消息条数（user + agent 各算一条）
    pub fn new(capacity: usize) -> Self {
        Self {
            pairs: VecDeque::new(),
            capacity,
        }
    }

    /// 追加一对消息；超出容量时弹出最旧的若干对（旧 -> 新顺序返回）
    pub fn push_pair(&mut self, pair: TurnPair) -> Vec<TurnPair> {
        self.pairs.push_back(pair);
        let mut evicted = Vec::new();
        while self.len() > self.capacity {
            match self.pairs.pop_front() {
                Some(oldest) => evicted.push(oldest),
                None => break,
            }
        }
        evicted
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.pairs
            .iter()
            .flat_map(|p| [p.user.clone(), p.agent.clone()])
            .collect()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &TurnPair> {
        self.pairs.iter()
    }

    /// 当前消息条数
    pub fn len(&self) -> usize {
        self.pairs.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
