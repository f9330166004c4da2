//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、Generator

pub mod embedding;
pub mod generator;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{Embedder, HashingEmbedder, OpenAiEmbedder};
pub use generator::{Generator, LlmGenerator};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;
