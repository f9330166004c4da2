//! 编排主循环
//!
//! Init（召回长期记忆）-> Deciding -> 动作 -> Deciding -> … -> Answering -> Done（写入记忆）。
//! 决策->动作 轮数受 turn_budget 限制，超出后强制回答并标记 degraded。
//! 每个阶段之间检查取消令牌；只有正常到达 Done 才会写入 MemoryStore。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{
    within, AgentError, Capability, ConversationState, RecoveryAction, RecoveryEngine, RunMetrics,
    RunPhase, ToolCallRequest,
};
use crate::decision::{
    AnswerRequest, Capabilities, Decision, DecisionEngine, GeneratedAnswer, Preference,
};
use crate::llm::{Embedder, Generator};
use crate::memory::{KnowledgeRetriever, MemoryStore, Turn};
use crate::orchestration::RunEvent;
use crate::tools::{ToolInvoker, WebSearcher};

/// 事件 / 日志中的预览最大字符数
const PREVIEW_CHARS: usize = 200;

/// 编排使用的能力提供方；searcher / retriever / tools 缺省表示该能力不可用
#[derive(Clone)]
pub struct Providers {
    pub generator: Arc<dyn Generator>,
    pub embedder: Arc<dyn Embedder>,
    pub searcher: Option<Arc<dyn WebSearcher>>,
    pub retriever: Option<Arc<dyn KnowledgeRetriever>>,
    pub tools: Option<Arc<dyn ToolInvoker>>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// 决策->动作 轮数上限
    pub turn_budget: u32,
    pub retrieval_top_k: usize,
    pub prefer: Preference,
    pub generator_timeout: Duration,
    pub embed_timeout: Duration,
    pub search_timeout: Duration,
    pub retrieval_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            turn_budget: 3,
            retrieval_top_k: 3,
            prefer: Preference::Retrieve,
            generator_timeout: Duration::from_secs(60),
            embed_timeout: Duration::from_secs(20),
            search_timeout: Duration::from_secs(15),
            retrieval_timeout: Duration::from_secs(10),
        }
    }
}

/// 单次运行的外部控制：trace_id、取消令牌、可选事件通道
#[derive(Debug, Clone)]
pub struct RunContext {
    pub trace_id: String,
    pub cancel: CancellationToken,
    pub events: Option<UnboundedSender<RunEvent>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, tx: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, ev: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(ev);
        }
    }

    fn checkpoint(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 一轮对话的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub sources: Vec<String>,
    pub metrics: RunMetrics,
    pub trace_id: String,
    /// 达到轮数上限后强制回答
    pub degraded: bool,
}

pub struct Orchestrator {
    engine: DecisionEngine,
    providers: Providers,
    memory: Arc<MemoryStore>,
    recovery: RecoveryEngine,
    options: OrchestratorOptions,
}

fn preview(text: &str) -> String {
    let p: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{p}...")
    } else {
        p
    }
}

impl Orchestrator {
    pub fn new(providers: Providers, memory: Arc<MemoryStore>, options: OrchestratorOptions) -> Self {
        let engine = DecisionEngine::new(
            providers.generator.clone(),
            options.generator_timeout,
            options.prefer,
        );
        Self {
            engine,
            providers,
            memory,
            recovery: RecoveryEngine::new(),
            options,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            web_search: self.providers.searcher.is_some(),
            retrieval: self.providers.retriever.is_some(),
        }
    }

    /// 运行一轮（无事件、不可取消）
    pub async fn run_turn(&self, session_id: &str, message: &str) -> Result<TurnOutcome, AgentError> {
        self.run_turn_with(session_id, message, RunContext::new()).await
    }

    pub async fn run_turn_with(
        &self,
        session_id: &str,
        message: &str,
        ctx: RunContext,
    ) -> Result<TurnOutcome, AgentError> {
        let span = tracing::info_span!("run_turn", session_id = %session_id, trace_id = %ctx.trace_id);
        let result = self.run(session_id, message, &ctx).instrument(span.clone()).await;
        if let Err(e) = &result {
            let _enter = span.enter();
            match e {
                AgentError::Cancelled => tracing::info!("run cancelled"),
                other => tracing::error!(error = %other, "run failed"),
            }
            ctx.emit(RunEvent::Error { text: e.to_string() });
        }
        result
    }

    async fn run(
        &self,
        session_id: &str,
        message: &str,
        ctx: &RunContext,
    ) -> Result<TurnOutcome, AgentError> {
        ctx.checkpoint()?;
        ctx.emit(RunEvent::Phase { phase: RunPhase::Init, cycle: 0 });
        let recalled = self.memory.recall(session_id, message).await;
        if let Some(pair) = &recalled {
            ctx.emit(RunEvent::MemoryRecalled { preview: preview(&pair.embedding_text()) });
        }
        let recent = self.memory.recent_turns(session_id).await;
        let mut state = ConversationState::new(message, recalled, recent);

        let tools = self
            .providers
            .tools
            .as_ref()
            .map(|t| t.tools())
            .unwrap_or_default();
        let capabilities = self.capabilities();
        let budget = self.options.turn_budget;
        let mut cycles: u32 = 0;
        let mut degraded = false;

        loop {
            ctx.checkpoint()?;
            if cycles >= budget {
                degraded = true;
                tracing::warn!(budget, "turn budget exhausted, forcing answer");
                ctx.emit(RunEvent::BudgetExhausted { budget });
                break;
            }

            ctx.emit(RunEvent::Phase { phase: RunPhase::Deciding, cycle: cycles });
            state.metrics.decisions += 1;
            let decision = self.engine.decide(&state, &tools, capabilities).await?;
            tracing::info!(action = decision.label(), cycle = cycles, "decision");

            let detail = match &decision {
                Decision::Search { query } => Some(query.clone()),
                Decision::Tool { name, .. } => Some(name.clone()),
                _ => None,
            };
            ctx.emit(RunEvent::Decided { action: decision.label().to_string(), detail });

            match decision {
                Decision::Answer => break,
                Decision::Search { query } => {
                    ctx.checkpoint()?;
                    ctx.emit(RunEvent::Phase { phase: RunPhase::Searching, cycle: cycles });
                    self.search(&mut state, &query, ctx).await?;
                }
                Decision::Retrieve => {
                    ctx.checkpoint()?;
                    ctx.emit(RunEvent::Phase { phase: RunPhase::Retrieving, cycle: cycles });
                    self.retrieve(&mut state, ctx).await?;
                }
                Decision::Tool { name, args } => {
                    ctx.checkpoint()?;
                    ctx.emit(RunEvent::Phase { phase: RunPhase::Invoking, cycle: cycles });
                    self.invoke(&mut state, name, args, ctx).await?;
                }
            }
            cycles += 1;
        }

        ctx.checkpoint()?;
        ctx.emit(RunEvent::Phase { phase: RunPhase::Answering, cycle: cycles });
        let answer = self.answer(&state).await?;
        state.answer = Some(answer.text.clone());

        // 取消后不写记忆；通过这里之后 append 与 archive 一次完成
        ctx.checkpoint()?;
        ctx.emit(RunEvent::Phase { phase: RunPhase::Done, cycle: cycles });
        self.memory
            .append(
                session_id,
                Turn::user(state.question.clone()),
                Turn::agent(answer.text.clone(), answer.sources.clone()),
            )
            .await;

        tracing::info!(
            searches = state.metrics.search_count,
            rag_hits = state.metrics.rag_hits,
            tool_calls = state.metrics.tool_calls,
            degraded,
            "turn complete"
        );
        ctx.emit(RunEvent::Answer {
            text: answer.text.clone(),
            sources: answer.sources.clone(),
        });

        Ok(TurnOutcome {
            answer: answer.text,
            sources: answer.sources,
            metrics: state.metrics,
            trace_id: ctx.trace_id.clone(),
            degraded,
        })
    }

    /// 动作失败：按恢复策略写成上下文片段；无法吸收的错误（如取消）向上返回
    fn absorb(
        &self,
        state: &mut ConversationState,
        phase: RunPhase,
        err: AgentError,
        ctx: &RunContext,
    ) -> Result<(), AgentError> {
        match self.recovery.handle(phase, &err) {
            RecoveryAction::AbsorbAsContext(fragment) => {
                tracing::warn!(?phase, error = %err, "step failed, continuing");
                ctx.emit(RunEvent::StepFailed { phase, reason: err.to_string() });
                state.push_context(fragment);
                Ok(())
            }
            _ => Err(err),
        }
    }

    async fn search(
        &self,
        state: &mut ConversationState,
        query: &str,
        ctx: &RunContext,
    ) -> Result<(), AgentError> {
        state.metrics.search_count += 1;
        let result = match &self.providers.searcher {
            Some(searcher) => {
                within(Capability::WebSearcher, self.options.search_timeout, searcher.search(query)).await
            }
            None => Err(AgentError::failure(Capability::WebSearcher, "no web searcher configured")),
        };
        match result {
            Ok(hits) => {
                tracing::info!(query = %query, hits = hits.len(), "search done");
                ctx.emit(RunEvent::Searched { query: query.to_string(), hits: hits.len() });
                for hit in &hits {
                    state.push_context(hit.to_fragment());
                    state.add_source(hit.url.clone());
                }
                Ok(())
            }
            Err(e) => self.absorb(state, RunPhase::Searching, e, ctx),
        }
    }

    async fn retrieve(&self, state: &mut ConversationState, ctx: &RunContext) -> Result<(), AgentError> {
        state.retrieval_attempted = true;
        let result = match &self.providers.retriever {
            Some(retriever) => {
                match within(
                    Capability::Embedder,
                    self.options.embed_timeout,
                    self.providers.embedder.embed(&state.question),
                )
                .await
                {
                    Ok(vector) => {
                        within(
                            Capability::KnowledgeRetriever,
                            self.options.retrieval_timeout,
                            retriever.query(&vector, self.options.retrieval_top_k),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                }
            }
            None => Err(AgentError::failure(
                Capability::KnowledgeRetriever,
                "no knowledge retriever configured",
            )),
        };
        match result {
            Ok(docs) => {
                tracing::info!(documents = docs.len(), "retrieval done");
                ctx.emit(RunEvent::Retrieved { documents: docs.len() });
                state.metrics.rag_hits += docs.len() as u32;
                state.add_documents(docs);
                Ok(())
            }
            Err(e) => self.absorb(state, RunPhase::Retrieving, e, ctx),
        }
    }

    async fn invoke(
        &self,
        state: &mut ConversationState,
        name: String,
        args: Value,
        ctx: &RunContext,
    ) -> Result<(), AgentError> {
        state.metrics.tool_calls += 1;
        state.pending_tool_call = Some(ToolCallRequest { name: name.clone(), args: args.clone() });
        let result = match &self.providers.tools {
            Some(tools) => tools.call(&name, args).await,
            None => Err(AgentError::UnknownBackend(name.clone())),
        };
        state.pending_tool_call = None;
        match result {
            Ok(output) => {
                ctx.emit(RunEvent::ToolResult { tool: name.clone(), preview: preview(&output) });
                state.push_context(format!("[tool {name}] {output}"));
                Ok(())
            }
            Err(e) => self.absorb(state, RunPhase::Invoking, e, ctx),
        }
    }

    async fn answer(&self, state: &ConversationState) -> Result<GeneratedAnswer, AgentError> {
        let req = AnswerRequest {
            question: &state.question,
            context: &state.accumulated_context,
            documents: &state.retrieved_documents,
            recalled: state.recalled_memory.as_ref(),
            recent_turns: &state.recent_turns,
            sources: state.sources(),
        };
        within(
            Capability::Generator,
            self.options.generator_timeout,
            self.providers.generator.generate_answer(&req),
        )
        .await
    }
}
