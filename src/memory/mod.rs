//! 记忆层：短期窗口（conversation）、长期归档（long_term / pinecone）、知识库检索（rag）与协调者 MemoryStore

pub mod conversation;
pub mod long_term;
pub mod pinecone;
pub mod rag;
pub mod store;

pub use conversation::{Message, Role, ShortTermWindow, Speaker, Turn, TurnPair};
pub use long_term::{
    ArchivedMemory, InMemoryVectorIndex, MemoryFilter, ScoredMemory, VectorIndex,
    MEMORY_RECORD_TYPE,
};
pub use pinecone::PineconeIndex;
pub use rag::{KnowledgeChunk, KnowledgeRetriever, LocalKnowledgeBase, RetrievedDocument};
pub use store::{MemoryStats, MemoryStore, MemoryStoreOptions};
