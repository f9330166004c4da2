//! Headless Agent 运行时
//!
//! 供 CLI 与 HTTP API 调用：from_config 按配置装配 LLM / Embedder / 记忆索引 / 搜索 / 知识库 / 工具后端，
//! run_turn 对单条用户输入跑一轮编排，登记到 SessionSupervisor 并记录评估数据。

use std::sync::Arc;
use std::time::Instant;

use crate::config::{AppConfig, IndexBackend};
use crate::core::{AgentError, RunMetrics, SessionSupervisor};
use crate::llm::{
    Embedder, HashingEmbedder, LlmClient, LlmGenerator, MockLlmClient, OpenAiClient,
    OpenAiEmbedder,
};
use crate::memory::{
    InMemoryVectorIndex, KnowledgeRetriever, LocalKnowledgeBase, MemoryStats, MemoryStore,
    MemoryStoreOptions, PineconeIndex, VectorIndex,
};
use crate::observability::{EvalEntry, EvalLog};
use crate::orchestration::{Orchestrator, OrchestratorOptions, Providers, RunContext, TurnOutcome};
use crate::tools::{
    DuckDuckGoSearcher, EchoTool, LocalToolBackend, McpHttpBackend, ToolDescriptor, ToolExecutor,
    ToolInvoker, ToolRegistry, ToolRouter, WebSearcher,
};

/// 可多会话共享的运行时
pub struct AgentRuntime {
    orchestrator: Orchestrator,
    tools: Option<Arc<dyn ToolInvoker>>,
    supervisor: SessionSupervisor,
    evals: EvalLog,
    default_session: String,
}

impl AgentRuntime {
    pub fn new(
        orchestrator: Orchestrator,
        tools: Option<Arc<dyn ToolInvoker>>,
        default_session: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            tools,
            supervisor: SessionSupervisor::new(),
            evals: EvalLog::default(),
            default_session: default_session.into(),
        }
    }

    /// 从配置与进程环境变量装配
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        Self::from_config_with_env(cfg, |key| std::env::var(key).ok()).await
    }

    /// env 用于读取凭据（OPENAI_API_KEY、PINECONE_API_KEY 与各工具后端的 credential_env）
    pub async fn from_config_with_env(
        cfg: &AppConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AgentError> {
        cfg.validate()?;
        let timeouts = &cfg.timeouts;
        let dimension = cfg.embedding.dimension;
        let openai_key = env("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());

        let (llm, embedder): (Arc<dyn LlmClient>, Arc<dyn Embedder>) = match &openai_key {
            Some(key) => {
                let base_url = cfg.llm.base_url.as_deref();
                tracing::info!(model = %cfg.llm.model, embedding = %cfg.embedding.model, "using OpenAI-compatible providers");
                (
                    Arc::new(OpenAiClient::new(base_url, &cfg.llm.model, key, cfg.llm.temperature)),
                    Arc::new(OpenAiEmbedder::new(base_url, &cfg.embedding.model, key, dimension)),
                )
            }
            None => {
                tracing::warn!("OPENAI_API_KEY not set, falling back to mock LLM and hashing embedder");
                (
                    Arc::new(MockLlmClient::default()),
                    Arc::new(HashingEmbedder::new(dimension)),
                )
            }
        };

        let index: Arc<dyn VectorIndex> = match cfg.memory.index {
            IndexBackend::Memory => Arc::new(InMemoryVectorIndex::new(dimension)),
            IndexBackend::Pinecone => {
                let api_key = env("PINECONE_API_KEY").ok_or_else(|| {
                    AgentError::config("memory.index = \"pinecone\" requires PINECONE_API_KEY")
                })?;
                Arc::new(PineconeIndex::new(
                    cfg.memory.pinecone.host.as_deref().unwrap_or_default(),
                    &api_key,
                    cfg.memory.pinecone.namespace.as_deref(),
                    dimension,
                    timeouts.index(),
                )?)
            }
        };

        let memory = Arc::new(MemoryStore::new(
            embedder.clone(),
            index,
            MemoryStoreOptions {
                window_size: cfg.memory.window_size,
                retrieval_k: cfg.memory.retrieval_k,
                min_recall_score: cfg.memory.min_recall_score,
                embed_timeout: timeouts.embedder(),
                index_timeout: timeouts.index(),
            },
        )?);

        let searcher: Option<Arc<dyn WebSearcher>> = if cfg.search.enabled {
            Some(Arc::new(DuckDuckGoSearcher::new(
                cfg.search.endpoint.as_deref(),
                cfg.search.max_results,
                timeouts.search(),
            )?))
        } else {
            None
        };

        let retriever: Option<Arc<dyn KnowledgeRetriever>> = match &cfg.retrieval.knowledge_path {
            Some(path) => {
                let kb = LocalKnowledgeBase::load(path)?;
                if !kb.is_empty() && kb.dimension() != dimension {
                    return Err(AgentError::config(format!(
                        "knowledge base dimension {} does not match embedding.dimension {}",
                        kb.dimension(),
                        dimension
                    )));
                }
                Some(Arc::new(kb))
            }
            None => None,
        };

        let tools = build_tools(cfg, &env)?;
        if let Some(tools) = &tools {
            let found = tools.discover().await;
            tracing::info!(tools = found.len(), "tool discovery finished");
        }

        let providers = Providers {
            generator: Arc::new(LlmGenerator::new(llm)),
            embedder,
            searcher,
            retriever,
            tools: tools.clone(),
        };
        let options = OrchestratorOptions {
            turn_budget: cfg.routing.turn_budget,
            retrieval_top_k: cfg.retrieval.top_k,
            prefer: cfg.routing.prefer,
            generator_timeout: timeouts.generator(),
            embed_timeout: timeouts.embedder(),
            search_timeout: timeouts.search(),
            retrieval_timeout: timeouts.retrieval(),
        };
        let orchestrator = Orchestrator::new(providers, memory, options);
        Ok(Self::new(orchestrator, tools, cfg.app.default_session.clone()))
    }

    /// session_id 为空时使用默认会话
    pub fn session_or_default(&self, session_id: Option<&str>) -> String {
        session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_session.as_str())
            .to_string()
    }

    /// 向运行监管登记一次 run，返回解析后的会话与接管后的上下文。
    /// 新的取消令牌在 ctx.cancel 或监管取消时都会触发；在派生任务之前调用可保证随后的取消不丢失
    pub fn register(&self, session_id: Option<&str>, mut ctx: RunContext) -> (String, RunContext) {
        let session_id = self.session_or_default(session_id);
        ctx.cancel = self.supervisor.begin(&ctx.trace_id, &session_id, &ctx.cancel);
        (session_id, ctx)
    }

    /// 跑一轮对话；已通过 register 登记的 trace_id 沿用原令牌
    pub async fn run_turn(
        &self,
        session_id: Option<&str>,
        message: &str,
        ctx: RunContext,
    ) -> Result<TurnOutcome, AgentError> {
        let (session_id, ctx) = self.register(session_id, ctx);
        let trace_id = ctx.trace_id.clone();

        let start = Instant::now();
        let result = self.orchestrator.run_turn_with(&session_id, message, ctx).await;
        self.supervisor.finish(&trace_id);

        let metrics = result
            .as_ref()
            .map(|o| o.metrics.clone())
            .unwrap_or_else(|_| RunMetrics::default());
        self.evals.record(EvalEntry {
            session_id,
            trace_id,
            latency_ms: start.elapsed().as_millis() as u64,
            searches: metrics.search_count,
            rag_hits: metrics.rag_hits,
            tool_calls: metrics.tool_calls,
            degraded: result.as_ref().map(|o| o.degraded).unwrap_or(false),
            ok: result.is_ok(),
            at: chrono::Utc::now().to_rfc3339(),
        });
        result
    }

    /// 重新查询各工具后端
    pub async fn refresh_tools(&self) -> Vec<ToolDescriptor> {
        match &self.tools {
            Some(tools) => tools.discover().await,
            None => Vec::new(),
        }
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.as_ref().map(|t| t.tools()).unwrap_or_default()
    }

    pub fn evals(&self) -> Vec<EvalEntry> {
        self.evals.snapshot()
    }

    pub async fn memory_stats(&self, session_id: &str) -> MemoryStats {
        self.orchestrator.memory().stats(session_id).await
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

/// 注册本地后端与凭据齐全的 MCP 后端；一个都没有时返回 None
fn build_tools(
    cfg: &AppConfig,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Option<Arc<dyn ToolInvoker>>, AgentError> {
    let mut router = ToolRouter::new();
    if cfg.tools.local {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        router.register(Arc::new(LocalToolBackend::new("local", registry)))?;
    }
    for backend in cfg.tools.backends.iter().filter(|b| b.enabled) {
        let Some(credentials) = backend.credentials(env) else {
            tracing::info!(
                backend = %backend.name,
                required = ?backend.credential_env,
                "tool backend skipped: credentials not set"
            );
            continue;
        };
        router.register(Arc::new(McpHttpBackend::new(
            backend.name.clone(),
            backend.url.clone(),
            backend.authorization(&credentials),
            cfg.timeouts.tool(),
        )?))?;
    }
    if router.is_empty() {
        return Ok(None);
    }
    tracing::info!(backends = ?router.backend_names(), "tool backends registered");
    Ok(Some(Arc::new(ToolExecutor::new(router, cfg.timeouts.tool()))))
}
