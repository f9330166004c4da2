//! 错误恢复引擎
//!
//! 根据所处阶段与 AgentError 返回 RecoveryAction：动作步骤（搜索 / 检索 / 工具）的失败吸收为上下文片段，
//! 决策解析失败回退为 Answer，生成能力失败终止本轮。

use crate::core::{AgentError, RecoveryAction, RunPhase};

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, phase: RunPhase, err: &AgentError) -> RecoveryAction {
        match (phase, err) {
            (_, AgentError::Cancelled) => RecoveryAction::Abort,
            (RunPhase::Deciding, AgentError::MalformedDecision(_)) => {
                RecoveryAction::FallbackToAnswer
            }
            (RunPhase::Searching, e) => {
                RecoveryAction::AbsorbAsContext(format!("[search failed] {e}"))
            }
            (RunPhase::Retrieving, e) => {
                RecoveryAction::AbsorbAsContext(format!("[retrieval failed] {e}"))
            }
            (RunPhase::Invoking, e) => {
                RecoveryAction::AbsorbAsContext(format!("[tool call failed] {e}"))
            }
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Capability;

    #[test]
    fn test_malformed_decision_falls_back_to_answer() {
        let engine = RecoveryEngine::new();
        let err = AgentError::MalformedDecision("not json".to_string());
        assert_eq!(
            engine.handle(RunPhase::Deciding, &err),
            RecoveryAction::FallbackToAnswer
        );
    }

    #[test]
    fn test_generator_failure_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::failure(Capability::Generator, "HTTP 500");
        assert_eq!(engine.handle(RunPhase::Deciding, &err), RecoveryAction::Abort);
        assert_eq!(engine.handle(RunPhase::Answering, &err), RecoveryAction::Abort);
    }

    #[test]
    fn test_action_failures_are_absorbed() {
        let engine = RecoveryEngine::new();
        let err = AgentError::UnknownBackend("unknown".to_string());
        match engine.handle(RunPhase::Invoking, &err) {
            RecoveryAction::AbsorbAsContext(fragment) => {
                assert!(fragment.contains("unknown"));
                assert!(fragment.starts_with("[tool call failed]"));
            }
            other => panic!("Expected AbsorbAsContext, got {other:?}"),
        }
        let timeout = AgentError::ProviderTimeout {
            capability: Capability::WebSearcher,
            after: std::time::Duration::from_secs(5),
        };
        assert!(matches!(
            engine.handle(RunPhase::Searching, &timeout),
            RecoveryAction::AbsorbAsContext(_)
        ));
    }

    #[test]
    fn test_cancelled_always_aborts() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(RunPhase::Searching, &AgentError::Cancelled),
            RecoveryAction::Abort
        );
    }
}
