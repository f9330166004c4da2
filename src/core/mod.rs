//! 核心层：错误与恢复、单轮状态、运行监管

pub mod error;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use error::{within, AgentError, Capability, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{ConversationState, RunMetrics, RunPhase, ToolCallRequest};
