//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 (RunPhase, AgentError) 决定吸收为上下文片段 / 回退为 Answer / 终止本轮。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// 外部能力提供方（用于错误归因与日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Generator,
    Embedder,
    WebSearcher,
    KnowledgeRetriever,
    VectorIndex,
    ToolInvoker,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Generator => "generator",
            Capability::Embedder => "embedder",
            Capability::WebSearcher => "web_searcher",
            Capability::KnowledgeRetriever => "knowledge_retriever",
            Capability::VectorIndex => "vector_index",
            Capability::ToolInvoker => "tool_invoker",
        };
        f.write_str(name)
    }
}

/// 单轮编排过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("{capability} timed out after {}ms", .after.as_millis())]
    ProviderTimeout {
        capability: Capability,
        after: Duration,
    },

    /// 网络 / 4xx / 5xx 等外部能力失败
    #[error("{capability} failed: {message}")]
    ProviderFailure {
        capability: Capability,
        message: String,
    },

    /// 生成式输出无法解析为合法 Decision
    #[error("Malformed decision: {0}")]
    MalformedDecision(String),

    /// 工具名前缀没有对应的已注册后端
    #[error("Unknown tool backend: {0}")]
    UnknownBackend(String),

    /// 启动期配置错误（维度不一致、启用路径缺少凭据等），请求期不会出现
    #[error("Config error: {0}")]
    ConfigurationError(String),

    /// 外部取消（如客户端断开）
    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn failure(capability: Capability, message: impl fmt::Display) -> Self {
        AgentError::ProviderFailure {
            capability,
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AgentError::ConfigurationError(message.into())
    }

    /// 是否来自生成能力（Deciding / Answering 阶段遇到即终止本轮）
    pub fn is_generator_failure(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderTimeout { capability: Capability::Generator, .. }
                | AgentError::ProviderFailure { capability: Capability::Generator, .. }
        )
    }
}

/// 恢复引擎根据错误与所处阶段给出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 将失败写成一条上下文片段，继续回到 Deciding
    AbsorbAsContext(String),
    /// 决策无法解析：直接进入 Answering
    FallbackToAnswer,
    /// 终止本轮，不产生部分回答
    Abort,
}

/// 对外部调用施加超时；超时与提供方失败等价处理
pub async fn within<T, F>(capability: Capability, limit: Duration, fut: F) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::ProviderTimeout {
            capability,
            after: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_maps_elapsed_to_timeout() {
        let result: Result<(), AgentError> = within(
            Capability::WebSearcher,
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
        )
        .await;
        assert_eq!(
            result,
            Err(AgentError::ProviderTimeout {
                capability: Capability::WebSearcher,
                after: Duration::from_millis(10),
            })
        );
    }

    #[tokio::test]
    async fn test_within_passes_inner_result() {
        let ok = within(Capability::Embedder, Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
    }

    #[test]
    fn test_generator_failure_detection() {
        assert!(AgentError::failure(Capability::Generator, "503").is_generator_failure());
        assert!(!AgentError::failure(Capability::WebSearcher, "503").is_generator_failure());
        assert!(!AgentError::MalformedDecision("x".into()).is_generator_failure());
    }

    #[test]
    fn test_display() {
        let e = AgentError::ProviderTimeout {
            capability: Capability::Generator,
            after: Duration::from_millis(1500),
        };
        assert_eq!(e.to_string(), "generator timed out after 1500ms");
    }
}
