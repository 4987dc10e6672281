//! Event bus and named queues (§4.1), backed by Redis Streams for the six
//! named, at-least-once FIFO queues and Redis Pub/Sub for the fan-out
//! `user:<id>:events` bus.

pub mod bus;
pub mod client;

pub use bus::EventBus;
pub use client::QueueClient;

/// The six named queues on the ephemeral store (§6).
pub mod names {
    pub const PROMPT: &str = "cortexd:queue:prompt";
    pub const MEMORY_CHUNKER: &str = "cortexd:queue:memory_chunker";
    pub const EPISODIC: &str = "cortexd:queue:episodic";
    pub const SEMANTIC: &str = "cortexd:queue:semantic";
    pub const REFLECTION: &str = "cortexd:queue:reflection";
    pub const PERSISTENT_TASK: &str = "cortexd:queue:persistent_task";

    pub const ALL: &[&str] = &[
        PROMPT,
        MEMORY_CHUNKER,
        EPISODIC,
        SEMANTIC,
        REFLECTION,
        PERSISTENT_TASK,
    ];
}

/// Config constants for queue behavior.
pub mod config {
    /// Consumer group used by every worker pulling from the named queues.
    pub const CONSUMER_GROUP: &str = "cortexd-workers";
    /// A message not acked within this window is considered abandoned and
    /// becomes eligible for re-delivery (visibility-timeout pattern, §9).
    pub const VISIBILITY_TIMEOUT_MS: u64 = 30_000;
    /// Approximate cap enforced on each queue stream.
    pub const MAXLEN_APPROX: usize = 100_000;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("transient: connection failed: {0}")]
    Transient(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("contract: queue not found: {0}")]
    Contract(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
