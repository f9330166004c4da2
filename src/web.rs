//! HTTP API（feature = "web"）
//!
//! - GET  /health
//! - POST /api/chat          {message, session_id?} -> {answer, sources, trace_id, metrics, degraded}
//! - GET  /api/evals         最近运行的评估记录
//! - GET  /api/tools         已发现的工具
//! - POST /api/tools/refresh 重新发现工具
//! - GET  /api/memory/:session
//!
//! 每个请求先向运行监管登记，再在独立任务中执行；客户端断开时 handler 被丢弃，CancelOnDrop 取消该 run，
//! 编排在下一个安全点停止，不会留下写了一半的记忆。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::agent::AgentRuntime;
use crate::core::{AgentError, RunMetrics};
use crate::orchestration::RunContext;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub trace_id: String,
    pub metrics: RunMetrics,
    pub degraded: bool,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(api_chat))
        .route("/api/evals", get(api_evals))
        .route("/api/tools", get(api_tools))
        .route("/api/tools/refresh", post(api_tools_refresh))
        .route("/api/memory/:session", get(api_memory))
        .with_state(runtime)
}

fn error_response(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": text.into() }))).into_response()
}

fn status_for(err: &AgentError) -> StatusCode {
    match err {
        e if e.is_generator_failure() => StatusCode::BAD_GATEWAY,
        AgentError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// handler 被丢弃（客户端断开）时取消对应 run
struct CancelOnDrop {
    runtime: Arc<AgentRuntime>,
    trace_id: String,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.runtime.supervisor().cancel(&self.trace_id) {
            tracing::info!(trace_id = %self.trace_id, "client went away, run cancelled");
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn api_chat(
    State(runtime): State<Arc<AgentRuntime>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is empty");
    }

    // 先登记再派生任务：handler 在任务开始前被丢弃时，取消也不会丢失
    let (session_id, ctx) = runtime.register(req.session_id.as_deref(), RunContext::new());
    let guard = CancelOnDrop {
        runtime: runtime.clone(),
        trace_id: ctx.trace_id.clone(),
    };
    let task_runtime = runtime.clone();
    let handle = tokio::spawn(async move {
        task_runtime
            .run_turn(Some(session_id.as_str()), &message, ctx)
            .await
    });
    let joined = handle.await;
    drop(guard);

    match joined {
        Ok(Ok(outcome)) => Json(ChatResponse {
            answer: outcome.answer,
            sources: outcome.sources,
            trace_id: outcome.trace_id,
            metrics: outcome.metrics,
            degraded: outcome.degraded,
        })
        .into_response(),
        Ok(Err(e)) => error_response(status_for(&e), e.to_string()),
        Err(e) => {
            tracing::error!(error = %e, "run task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "run task failed")
        }
    }
}

async fn api_evals(State(runtime): State<Arc<AgentRuntime>>) -> Response {
    Json(runtime.evals()).into_response()
}

async fn api_tools(State(runtime): State<Arc<AgentRuntime>>) -> Response {
    Json(runtime.tools()).into_response()
}

async fn api_tools_refresh(State(runtime): State<Arc<AgentRuntime>>) -> Response {
    Json(runtime.refresh_tools().await).into_response()
}

async fn api_memory(
    State(runtime): State<Arc<AgentRuntime>>,
    Path(session): Path<String>,
) -> Response {
    Json(runtime.memory_stats(&session).await).into_response()
}
