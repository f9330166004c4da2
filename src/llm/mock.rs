//! Mock LLM 客户端（用于测试与无 API Key 的离线运行）
//!
//! 按脚本依次返回预置回复；脚本耗尽后返回 fallback，未设置 fallback 时回显最后一条 User 消息。
//! 回显文本不是合法的决策 JSON，离线运行时决策会回退为 Answer，从而跑通整条流程。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    /// 按顺序返回 responses 中的结果
    pub fn scripted(responses: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// 每次都返回同一回复
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            fallback: Some(response.into()),
            ..Self::default()
        }
    }

    /// 脚本耗尽后的固定回复
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// 已收到的请求（用于断言提示词内容）
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(result) = next {
            return result;
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockLlmClient::scripted(vec![Ok("one".into()), Err("boom".into())])
            .with_fallback("rest");
        let msgs = [Message::user("q")];
        assert_eq!(mock.complete(&msgs).await, Ok("one".to_string()));
        assert_eq!(mock.complete(&msgs).await, Err("boom".to_string()));
        assert_eq!(mock.complete(&msgs).await, Ok("rest".to_string()));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_echo_without_script() {
        let mock = MockLlmClient::default();
        let out = mock
            .complete(&[Message::system("sys"), Message::user("hello")])
            .await
            .unwrap();
        assert_eq!(out, "Echo from Mock: hello");
    }
}
