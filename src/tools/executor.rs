//! 工具执行器
//!
//! 持有 ToolRouter 与调用超时，call(name, args) 先做前缀路由再在超时内调用后端；
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{within, AgentError, Capability};
use crate::tools::{ToolDescriptor, ToolInvoker, ToolRouter};

pub struct ToolExecutor {
    router: ToolRouter,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(router: ToolRouter, timeout: Duration) -> Self {
        Self { router, timeout }
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    async fn route_and_call(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let (backend, tool) = self.router.resolve(name)?;
        within(Capability::ToolInvoker, self.timeout, backend.call_tool(&tool, args)).await
    }
}

#[async_trait]
impl ToolInvoker for ToolExecutor {
    fn tools(&self) -> Vec<ToolDescriptor> {
        self.router.tools()
    }

    async fn discover(&self) -> Vec<ToolDescriptor> {
        self.router.discover(self.timeout).await
    }

    async fn call(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let preview = args_preview(&args);
        let result = self.route_and_call(name, args).await;

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(AgentError::UnknownBackend(_)) => (false, "unknown_backend"),
            Err(AgentError::ProviderTimeout { .. }) => (false, "timeout"),
            Err(_) => (false, "error"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{BackendTool, EchoTool, LocalToolBackend, ToolBackend, ToolRegistry};
    use serde_json::json;
    use std::sync::Arc;

    struct SlowBackend;

    #[async_trait]
    impl ToolBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn list_tools(&self) -> Result<Vec<BackendTool>, AgentError> {
            Ok(vec![BackendTool { name: "wait".into(), description: String::new() }])
        }

        async fn call_tool(&self, _tool: &str, _args: Value) -> Result<String, AgentError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok("late".into())
        }
    }

    fn executor(timeout: Duration) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let mut router = ToolRouter::new();
        router
            .register(Arc::new(LocalToolBackend::new("local", registry)))
            .unwrap();
        router.register(Arc::new(SlowBackend)).unwrap();
        ToolExecutor::new(router, timeout)
    }

    #[tokio::test]
    async fn test_call_routes_by_prefix() {
        let exec = executor(Duration::from_secs(1));
        let out = exec.call("local_echo", json!({"text": "ping"})).await.unwrap();
        assert_eq!(out, "ping");
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let exec = executor(Duration::from_secs(1));
        let err = exec.call("unknown_foo", json!({})).await.unwrap_err();
        assert_eq!(err, AgentError::UnknownBackend("unknown".into()));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_provider_timeout() {
        let exec = executor(Duration::from_millis(20));
        let err = exec.call("slow_wait", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderTimeout { capability: Capability::ToolInvoker, .. }
        ));
    }

    #[tokio::test]
    async fn test_discover_caches_descriptors() {
        let exec = executor(Duration::from_secs(1));
        assert!(exec.tools().is_empty());
        let found = exec.discover().await;
        assert_eq!(found.len(), 2);
        assert_eq!(exec.tools(), found);
        assert_eq!(found[0].name, "local_echo");
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        let p = args_preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 203);
    }
}
