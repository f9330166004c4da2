//! MCP（Model Context Protocol）HTTP 工具后端
//!
//! JSON-RPC 2.0 over HTTP：initialize -> notifications/initialized -> tools/list | tools/call。
//! 响应可能是 application/json，也可能是 text/event-stream（取 `data:` 行中带 id 的那条）。
//! 服务端返回 Mcp-Session-Id 时后续请求带上。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::core::{AgentError, Capability};
use crate::tools::{BackendTool, ToolBackend};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "Mcp-Session-Id";

pub struct McpHttpBackend {
    name: String,
    url: String,
    authorization: Option<String>,
    client: Client,
    /// None = 尚未 initialize；Some("") = 服务端未分配会话
    session: Mutex<Option<String>>,
    next_id: AtomicU64,
}

fn failure(message: impl std::fmt::Display) -> AgentError {
    AgentError::failure(Capability::ToolInvoker, message)
}

impl McpHttpBackend {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        authorization: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::config(format!("mcp client: {e}")))?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            authorization,
            client,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    fn request(&self, body: &Value, session: Option<&str>) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(auth) = &self.authorization {
            req = req.header(AUTHORIZATION, auth);
        }
        if let Some(id) = session.filter(|s| !s.is_empty()) {
            req = req.header(SESSION_HEADER, id);
        }
        req
    }

    async fn send(
        &self,
        method: &str,
        params: Value,
        session: Option<&str>,
    ) -> Result<(Value, Option<String>), AgentError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let resp = self
            .request(&body, session)
            .send()
            .await
            .map_err(|e| failure(format!("{} {method}: {e}", self.name)))?;
        let status = resp.status();
        let assigned = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = resp
            .text()
            .await
            .map_err(|e| failure(format!("{} {method}: read body: {e}", self.name)))?;
        if !status.is_success() {
            return Err(failure(format!("{} {method}: HTTP {status}", self.name)));
        }
        let message = parse_rpc_body(&content_type, &text)?;
        Ok((rpc_result(message)?, assigned))
    }

    async fn ensure_session(&self) -> Result<Option<String>, AgentError> {
        let mut session = self.session.lock().await;
        if let Some(id) = session.as_ref() {
            return Ok(Some(id.clone()));
        }
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }
        });
        let (_, assigned) = self.send("initialize", params, None).await?;
        let id = assigned.unwrap_or_default();

        let note = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        if let Err(e) = self.request(&note, Some(id.as_str())).send().await {
            tracing::debug!(backend = %self.name, error = %e, "initialized notification failed");
        }
        tracing::info!(backend = %self.name, "mcp session initialized");
        *session = Some(id.clone());
        Ok(Some(id))
    }
}

/// 解析 JSON 或 SSE 响应体，返回 JSON-RPC 响应对象
fn parse_rpc_body(content_type: &str, body: &str) -> Result<Value, AgentError> {
    if content_type.contains("text/event-stream") {
        return body
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
            .filter(|v| v.get("id").is_some_and(|id| !id.is_null()))
            .last()
            .ok_or_else(|| failure("no JSON-RPC response in event stream"));
    }
    serde_json::from_str(body).map_err(|e| failure(format!("invalid JSON-RPC response: {e}")))
}

fn rpc_result(message: Value) -> Result<Value, AgentError> {
    if let Some(err) = message.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(failure(format!("rpc error: {msg}")));
    }
    message
        .get("result")
        .cloned()
        .ok_or_else(|| failure("JSON-RPC response without result"))
}

/// tools/call 结果：取第一段文本内容；isError 为 true 时视为失败
fn call_output(result: &Value) -> Result<String, AgentError> {
    let text = result
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| result.to_string());
    if result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Err(failure(text));
    }
    Ok(text)
}

#[async_trait]
impl ToolBackend for McpHttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<BackendTool>, AgentError> {
        let session = self.ensure_session().await?;
        let (result, _) = self.send("tools/list", json!({}), session.as_deref()).await?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(tools).map_err(|e| failure(format!("decode tools/list: {e}")))
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<String, AgentError> {
        let session = self.ensure_session().await?;
        let params = json!({ "name": tool, "arguments": args });
        let (result, _) = self.send("tools/call", params, session.as_deref()).await?;
        call_output(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_body() {
        let v = parse_rpc_body("application/json", r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#)
            .unwrap();
        assert_eq!(rpc_result(v).unwrap(), json!({"tools": []}));
    }

    #[test]
    fn test_parse_event_stream_body() {
        let body = "event: message\n\
data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
event: message\n\
data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"Sunny\"}]}}\n\n";
        let v = parse_rpc_body("text/event-stream; charset=utf-8", body).unwrap();
        assert_eq!(call_output(&rpc_result(v).unwrap()).unwrap(), "Sunny");
    }

    #[test]
    fn test_rpc_error_is_failure() {
        let v = json!({"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}});
        let err = rpc_result(v).unwrap_err();
        assert!(err.to_string().contains("method not found"));
    }

    #[test]
    fn test_tool_error_result() {
        let r = json!({"content":[{"type":"text","text":"city not found"}],"isError":true});
        assert_eq!(
            call_output(&r).unwrap_err(),
            AgentError::failure(Capability::ToolInvoker, "city not found")
        );
    }

    #[test]
    fn test_non_text_result_is_serialized() {
        let r = json!({"content":[]});
        assert_eq!(call_output(&r).unwrap(), r.to_string());
    }

    #[test]
    fn test_backend_tool_decoding() {
        let tools: Vec<BackendTool> = serde_json::from_value(json!([
            {"name": "get_weather", "description": "Current weather", "inputSchema": {}},
            {"name": "ping"}
        ]))
        .unwrap();
        assert_eq!(tools[1].description, "");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_provider_failure() {
        let backend = McpHttpBackend::new(
            "weather",
            "http://127.0.0.1:9/mcp",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = backend.list_tools().await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderFailure { capability: Capability::ToolInvoker, .. }
        ));
    }
}
