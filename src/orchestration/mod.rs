//! 编排层：Init -> Deciding -> {Searching, Retrieving, Invoking} -> Deciding -> … -> Answering -> Done

pub mod events;
pub mod loop_;

pub use events::RunEvent;
pub use loop_::{Orchestrator, OrchestratorOptions, Providers, RunContext, TurnOutcome};
