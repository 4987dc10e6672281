#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! cortexd - a standing memory and conversational-continuity daemon.
//!
//! A single process holds a user's working memory, episodic and semantic
//! stores, and a mode router in front of a respond/act/clarify loop, so that
//! a conversational agent in front of it can carry context across sessions
//! instead of starting cold each time.
//!
//! # Architecture
//!
//! - **memory**: working memory, gists, facts, episodes, concepts, traits
//! - **graph**: concept-to-concept association graph (spreading activation)
//! - **assembly**: budget-bounded context assembly across memory layers
//! - **topic**: topic classification and adaptive boundary detection
//! - **router**: weighted-signal mode routing (respond/act/clarify/acknowledge)
//! - **act**: the bounded iterate-dispatch-verify loop behind ACT mode
//! - **workers**: memory chunker, episodic/semantic consolidation, decay
//! - **regulators**: routing- and topic-stability governors, reflection
//! - **scheduler**: durable reminder/task polling
//! - **queues**: Redis Streams event bus between the API and the workers
//! - **config**: parametrizable budgets, weights, and decay constants

pub mod act;
pub mod api;
pub mod assembly;
pub mod config;
pub mod core;
pub mod embeddings;
pub mod graph;
pub mod memory;
pub mod persistence;
pub mod queues;
pub mod regulators;
pub mod resilience;
pub mod router;
pub mod scheduler;
pub mod topic;
pub mod workers;
// TUI removed - terminal UI is out of scope for a daemon process
