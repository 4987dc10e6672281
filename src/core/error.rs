//! Crate-wide error aggregator.
//!
//! Narrow APIs keep their own `<Module>Error` type (§2.1 of the design
//! notes); `CoreError` exists only for worker-boundary logging sites that
//! need to report "something in one of my dependencies failed" without
//! threading every module's error type through their own signature.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("memory store error: {0}")]
    Memory(#[from] crate::memory::MemoryError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queues::QueueError),

    #[error("graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),

    #[error("embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),

    #[error("router error: {0}")]
    Router(#[from] crate::router::RouterError),

    #[error("act loop error: {0}")]
    ActLoop(#[from] crate::act::ActLoopError),

    #[error("topic error: {0}")]
    Topic(#[from] crate::topic::TopicError),

    #[error("regulator error: {0}")]
    Regulator(#[from] crate::regulators::RegulatorError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] crate::scheduler::SchedulerError),

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
