//! 进程内工具注册表
//!
//! 本地工具实现 Tool trait，由 ToolRegistry 按名注册；LocalToolBackend 把注册表包装成一个 ToolBackend，
//! 与远端 MCP 后端一样参与前缀路由。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, Capability};
use crate::tools::{BackendTool, ToolBackend};

/// 工具 trait：名称、描述（供 LLM 理解）、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，遍历顺序稳定
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// 以注册表为后端
pub struct LocalToolBackend {
    name: String,
    registry: ToolRegistry,
}

impl LocalToolBackend {
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }
}

#[async_trait]
impl ToolBackend for LocalToolBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<BackendTool>, AgentError> {
        Ok(self
            .registry
            .tools
            .values()
            .map(|t| BackendTool {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect())
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<String, AgentError> {
        self.registry
            .execute(tool, args)
            .await
            .map_err(|e| AgentError::failure(Capability::ToolInvoker, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;
    use serde_json::json;

    #[tokio::test]
    async fn test_local_backend_lists_and_calls() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let backend = LocalToolBackend::new("local", registry);

        let tools = backend.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let out = backend.call_tool("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn test_unknown_local_tool_is_provider_failure() {
        let backend = LocalToolBackend::new("local", ToolRegistry::new());
        let err = backend.call_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderFailure { capability: Capability::ToolInvoker, .. }
        ));
    }
}
