//! Generator：生成决策与最终回答
//!
//! LlmGenerator 在 LlmClient 之上拼 system + 提示词，决策输出交给 parse_decision。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, Capability};
use crate::decision::prompt::{answer_prompt, decision_prompt, SYSTEM_PROMPT};
use crate::decision::{parse_decision, AnswerRequest, Decision, DecisionRequest, GeneratedAnswer};
use crate::llm::LlmClient;
use crate::memory::Message;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate_decision(&self, req: &DecisionRequest<'_>) -> Result<Decision, AgentError>;

    async fn generate_answer(&self, req: &AnswerRequest<'_>) -> Result<GeneratedAnswer, AgentError>;
}

pub struct LlmGenerator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    async fn complete(&self, prompt: String) -> Result<String, AgentError> {
        let messages = [Message::system(self.system_prompt.clone()), Message::user(prompt)];
        self.llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::failure(Capability::Generator, e))
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate_decision(&self, req: &DecisionRequest<'_>) -> Result<Decision, AgentError> {
        let raw = self.complete(decision_prompt(req)).await?;
        tracing::debug!(raw = %raw, "decision output");
        parse_decision(&raw, req.question)
    }

    async fn generate_answer(&self, req: &AnswerRequest<'_>) -> Result<GeneratedAnswer, AgentError> {
        let text = self.complete(answer_prompt(req)).await?;
        if text.trim().is_empty() {
            return Err(AgentError::failure(Capability::Generator, "empty answer"));
        }
        Ok(GeneratedAnswer {
            text,
            sources: req.sources.to_vec(),
        })
    }
}
