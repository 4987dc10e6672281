//! The per-message digest pipeline, plus consolidation: memory chunker ->
//! episodic builder -> semantic extractor, and the decay engine (§4.7, §4.8).
//!
//! Grounded on `actors::thought`'s end-to-end single-thought ownership for
//! the digest worker, and on `actors::sleep`'s mini-dream consolidation
//! cycle (replay a batch, strengthen memories, strengthen co-replayed
//! associations, track dream count — the same replay-then-reinforce shape
//! this chain follows) and on `memory_db`'s Hebbian
//! `strengthen_association`/`update_consolidation` for the numeric
//! reinforcement rules. Unlike the teacher's actors, each worker here pulls
//! from a named queue via `queues::QueueClient` rather than a ractor
//! mailbox, matching this system's "parallel workers cooperating via named
//! queues" scheduling model (§4.9).

pub mod chunker;
pub mod decay;
pub mod digest;
pub mod episodic;
pub mod semantic;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("transient: {0}")]
    Queue(#[from] crate::queues::QueueError),
    #[error("memory store failure: {0}")]
    Memory(#[from] crate::memory::MemoryError),
    #[error("graph failure: {0}")]
    Graph(#[from] crate::graph::GraphError),
    #[error("router failure: {0}")]
    Router(#[from] crate::router::RouterError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),
    #[error("extraction call failed: {0}")]
    Extraction(String),
    #[error("transient: {0}")]
    Transient(String),
    #[error("embedding failure: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),
}

impl From<redis::RedisError> for WorkerError {
    fn from(e: redis::RedisError) -> Self {
        Self::Transient(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Exchanges accumulate toward an episodic boundary every 6 exchanges by
/// default, or sooner if the topic changes (§4.8).
pub const EXCHANGES_PER_EPISODE: u32 = 6;
