//! DecisionEngine：一次决策 = 一次生成调用 + 约束
//!
//! 解析失败经 RecoveryEngine 回退为 Answer；生成能力失败 / 超时原样返回由编排终止本轮。
//! 约束：不可用的能力改写为偏好的另一信息动作或 Answer；本轮已检索过时再次 Retrieve 视为无新信息，改为 Answer。

use std::sync::Arc;
use std::time::Duration;

use crate::core::{within, AgentError, Capability, ConversationState, RecoveryAction, RecoveryEngine, RunPhase};
use crate::decision::{Capabilities, Decision, DecisionRequest, Preference};
use crate::llm::Generator;
use crate::tools::ToolDescriptor;

pub struct DecisionEngine {
    generator: Arc<dyn Generator>,
    timeout: Duration,
    prefer: Preference,
    recovery: RecoveryEngine,
}

impl DecisionEngine {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration, prefer: Preference) -> Self {
        Self {
            generator,
            timeout,
            prefer,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn prefer(&self) -> Preference {
        self.prefer
    }

    /// 基于当前工作状态决定下一步；不修改 state
    pub async fn decide(
        &self,
        state: &ConversationState,
        tools: &[ToolDescriptor],
        capabilities: Capabilities,
    ) -> Result<Decision, AgentError> {
        let req = DecisionRequest {
            question: &state.question,
            context: &state.accumulated_context,
            documents: &state.retrieved_documents,
            recalled: state.recalled_memory.as_ref(),
            recent_turns: &state.recent_turns,
            tools,
            capabilities,
            prefer: self.prefer,
            retrieval_attempted: state.retrieval_attempted,
        };

        let raw = within(
            Capability::Generator,
            self.timeout,
            self.generator.generate_decision(&req),
        )
        .await;

        match raw {
            Ok(decision) => Ok(self.constrain(decision, &req)),
            Err(err) => match self.recovery.handle(RunPhase::Deciding, &err) {
                RecoveryAction::FallbackToAnswer => {
                    tracing::warn!(error = %err, "unparseable decision, falling back to answer");
                    Ok(Decision::Answer)
                }
                _ => Err(err),
            },
        }
    }

    fn constrain(&self, decision: Decision, req: &DecisionRequest<'_>) -> Decision {
        match decision {
            Decision::Tool { .. } if req.tools.is_empty() => self.information_action(req),
            Decision::Search { .. } if !req.capabilities.web_search => self.information_action(req),
            Decision::Retrieve if !req.capabilities.retrieval => self.information_action(req),
            Decision::Retrieve if req.retrieval_attempted => Decision::Answer,
            other => other,
        }
    }

    /// 按偏好选择仍可用的信息动作；都不可用时回答
    fn information_action(&self, req: &DecisionRequest<'_>) -> Decision {
        let search = req.capabilities.web_search.then(|| Decision::Search {
            query: req.question.to_string(),
        });
        let retrieve = (req.capabilities.retrieval && !req.retrieval_attempted).then_some(Decision::Retrieve);
        let ordered = match self.prefer {
            Preference::Search => search.or(retrieve),
            Preference::Retrieve => retrieve.or(search),
        };
        let chosen = ordered.unwrap_or(Decision::Answer);
        tracing::debug!(rewritten_to = chosen.label(), "decision targeted an unavailable capability");
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{AnswerRequest, GeneratedAnswer};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// 按脚本返回决策结果的 Generator
    struct ScriptedGenerator {
        decisions: Mutex<Vec<Result<Decision, AgentError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedGenerator {
        fn new(mut decisions: Vec<Result<Decision, AgentError>>) -> Self {
            decisions.reverse();
            Self {
                decisions: Mutex::new(decisions),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate_decision(&self, _req: &DecisionRequest<'_>) -> Result<Decision, AgentError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.decisions.lock().unwrap().pop().unwrap_or(Ok(Decision::Answer))
        }

        async fn generate_answer(&self, _req: &AnswerRequest<'_>) -> Result<GeneratedAnswer, AgentError> {
            unreachable!("engine never answers")
        }
    }

    fn engine(decisions: Vec<Result<Decision, AgentError>>, prefer: Preference) -> DecisionEngine {
        DecisionEngine::new(
            Arc::new(ScriptedGenerator::new(decisions)),
            Duration::from_secs(5),
            prefer,
        )
    }

    fn state() -> ConversationState {
        ConversationState::new("what is tokio", None, Vec::new())
    }

    fn tool() -> ToolDescriptor {
        ToolDescriptor {
            name: "weather_get_weather".into(),
            backend: "weather".into(),
            description: "[WEATHER] forecast".into(),
        }
    }

    #[tokio::test]
    async fn test_malformed_decision_becomes_answer() {
        let e = engine(
            vec![Err(AgentError::MalformedDecision("garbage".into()))],
            Preference::Retrieve,
        );
        let d = e.decide(&state(), &[], Capabilities::default()).await.unwrap();
        assert_eq!(d, Decision::Answer);
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let e = engine(
            vec![Err(AgentError::failure(Capability::Generator, "HTTP 500"))],
            Preference::Retrieve,
        );
        let err = e.decide(&state(), &[], Capabilities::default()).await.unwrap_err();
        assert!(err.is_generator_failure());
    }

    #[tokio::test]
    async fn test_generator_timeout_propagates() {
        let mut generator = ScriptedGenerator::new(vec![Ok(Decision::Retrieve)]);
        generator.delay = Some(Duration::from_millis(200));
        let e = DecisionEngine::new(Arc::new(generator), Duration::from_millis(10), Preference::Retrieve);
        let err = e.decide(&state(), &[], Capabilities::default()).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderTimeout { capability: Capability::Generator, .. }
        ));
    }

    #[tokio::test]
    async fn test_tool_without_tools_is_rewritten_by_preference() {
        let tool_call = Decision::Tool { name: "x_y".into(), args: json!({}) };

        let e = engine(vec![Ok(tool_call.clone())], Preference::Search);
        assert_eq!(
            e.decide(&state(), &[], Capabilities::default()).await.unwrap(),
            Decision::Search { query: "what is tokio".into() }
        );

        let e = engine(vec![Ok(tool_call.clone())], Preference::Retrieve);
        assert_eq!(
            e.decide(&state(), &[], Capabilities::default()).await.unwrap(),
            Decision::Retrieve
        );

        let e = engine(vec![Ok(tool_call)], Preference::Retrieve);
        let none = Capabilities { web_search: false, retrieval: false };
        assert_eq!(e.decide(&state(), &[], none).await.unwrap(), Decision::Answer);
    }

    #[tokio::test]
    async fn test_tool_kept_when_tools_available() {
        let call = Decision::Tool { name: "weather_get_weather".into(), args: json!({"city": "Oslo"}) };
        let e = engine(vec![Ok(call.clone())], Preference::Retrieve);
        assert_eq!(
            e.decide(&state(), &[tool()], Capabilities::default()).await.unwrap(),
            call
        );
    }

    #[tokio::test]
    async fn test_repeated_retrieve_becomes_answer() {
        let e = engine(vec![Ok(Decision::Retrieve)], Preference::Retrieve);
        let mut s = state();
        s.retrieval_attempted = true;
        assert_eq!(
            e.decide(&s, &[], Capabilities::default()).await.unwrap(),
            Decision::Answer
        );
    }

    #[tokio::test]
    async fn test_unavailable_search_falls_back_to_retrieval() {
        let e = engine(
            vec![Ok(Decision::Search { query: "q".into() })],
            Preference::Search,
        );
        let caps = Capabilities { web_search: false, retrieval: true };
        assert_eq!(e.decide(&state(), &[], caps).await.unwrap(), Decision::Retrieve);
    }
}
