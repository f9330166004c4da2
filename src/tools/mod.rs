//! 工具层：外部工具后端、前缀路由与执行器，以及 Web 搜索
//!
//! 工具对外统一命名为 `<backend>_<tool>`；调用时按第一个 `_` 拆分，找到所属后端。

pub mod echo;
pub mod executor;
pub mod mcp;
pub mod registry;
pub mod router;
pub mod search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use mcp::McpHttpBackend;
pub use registry::{LocalToolBackend, Tool, ToolRegistry};
pub use router::{qualified_name, split_tool_name, ToolRouter};
pub use search::{DuckDuckGoSearcher, SearchHit, WebSearcher};

/// 已发现的工具（对 Decision Engine 可见）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// `<backend>_<tool>`
    pub name: String,
    pub backend: String,
    /// `[BACKEND] 原始描述`
    pub description: String,
}

/// 后端自报的工具（未加前缀）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 一个工具后端（MCP 服务、进程内注册表等）
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// 后端名，即工具名前缀；不含 `_`
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<BackendTool>, AgentError>;

    async fn call_tool(&self, tool: &str, args: Value) -> Result<String, AgentError>;
}

/// 编排层使用的工具调用能力
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// 最近一次 discover 的结果
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// 向所有后端重新查询工具列表
    async fn discover(&self) -> Vec<ToolDescriptor>;

    async fn call(&self, name: &str, args: Value) -> Result<String, AgentError>;
}
