//! 编排过程事件：供 CLI / Web 展示决策、搜索、检索、工具调用与回答

use serde::Serialize;

use crate::core::RunPhase;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 进入新阶段；cycle 为已完成的 决策->动作 轮数
    Phase { phase: RunPhase, cycle: u32 },
    /// 召回到的长期记忆（预览）
    MemoryRecalled { preview: String },
    /// 决策结果
    Decided { action: String, detail: Option<String> },
    Searched { query: String, hits: usize },
    Retrieved { documents: usize },
    ToolResult { tool: String, preview: String },
    /// 动作失败，已作为上下文片段交给下一次决策
    StepFailed { phase: RunPhase, reason: String },
    /// 达到轮数上限，强制回答
    BudgetExhausted { budget: u32 },
    Answer { text: String, sources: Vec<String> },
    Error { text: String },
}
