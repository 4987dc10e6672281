//! Memory Chunker: extracts gists, facts, and user traits from one message
//! cycle, writes them through the ephemeral stores, and enqueues an
//! episodic job once the thread crosses an exchange-count boundary or the
//! topic changes (§4.8).
//!
//! Grounded on `actors::thought`'s extract-then-write shape, re-pointed at
//! this chain's ephemeral sub-stores instead of the teacher's single
//! thought record, and on `scheduler::mod`'s pattern of keeping a small
//! dedicated Redis connection for state no other store already tracks.

use super::{Result, WorkerError, EXCHANGES_PER_EPISODE};
use crate::memory::types::{Fact, Gist, MessageCycle, TraitSource, UserTrait};
use crate::memory::MemoryStore;
use crate::queues::{names, QueueClient};
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Injected so this module stays free of any specific LLM client, matching
/// the `act::Planner` injection shape.
#[async_trait]
pub trait ChunkExtractor: Send + Sync {
    /// Returns `None` when the cycle carries nothing worth persisting
    /// (e.g. pure small talk).
    async fn extract(&self, cycle: &MessageCycle) -> Option<ChunkExtraction>;
}

#[derive(Debug, Clone, Default)]
pub struct ChunkExtraction {
    pub gists: Vec<GistDraft>,
    pub facts: Vec<FactDraft>,
    pub traits: Vec<TraitDraft>,
}

#[derive(Debug, Clone)]
pub struct GistDraft {
    pub content: String,
    pub gist_type: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct FactDraft {
    pub key: String,
    pub value: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct TraitDraft {
    pub trait_key: String,
    pub trait_value: String,
    pub category: String,
    pub confidence: f32,
    pub is_literal: bool,
    pub source: TraitSource,
}

/// Extracts nothing. Keeps the chunker loop draining its queue (so cycles
/// don't pile up) when no real extractor has been configured yet.
#[derive(Debug, Default)]
pub struct NullExtractor;

#[async_trait]
impl ChunkExtractor for NullExtractor {
    async fn extract(&self, _cycle: &MessageCycle) -> Option<ChunkExtraction> {
        None
    }
}

/// The payload dequeued from [`names::MEMORY_CHUNKER`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerJob {
    pub cycle: MessageCycle,
    pub user_id: String,
    pub topic_changed: bool,
}

mod keys {
    pub fn exchange_count(thread_id: &str) -> String {
        format!("cortexd:exchange_count:{thread_id}")
    }
}

/// Tracks exchanges-since-last-episode per thread. Kept separate from
/// [`crate::memory::ephemeral::EphemeralStore`]'s own key namespace since
/// no ephemeral entity models this counter directly.
pub struct ExchangeCounter {
    client: Client,
}

impl ExchangeCounter {
    /// # Errors
    /// Returns [`WorkerError::Transient`] if the Redis URL cannot be parsed.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Increment and return the new count.
    pub async fn increment(&self, thread_id: &str) -> Result<u32> {
        let mut conn = self.conn().await?;
        let count: u32 = conn.incr(keys::exchange_count(thread_id), 1).await?;
        Ok(count)
    }

    pub async fn reset(&self, thread_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(keys::exchange_count(thread_id), 0).await?;
        Ok(())
    }
}

/// Process one dequeued message cycle: extract, write through the
/// ephemeral stores, and enqueue an episodic job if the thread has
/// crossed the exchange boundary (every [`EXCHANGES_PER_EPISODE`]
/// exchanges by default, or sooner on topic change). Returns whether the
/// boundary was crossed.
///
/// # Errors
/// Returns [`WorkerError`] if any ephemeral write, the exchange counter,
/// or the episodic enqueue fails.
pub async fn process_job(
    store: &MemoryStore,
    extractor: &dyn ChunkExtractor,
    counter: &ExchangeCounter,
    queue: &mut QueueClient,
    job: &ChunkerJob,
) -> Result<bool> {
    let thread_id = job.cycle.thread_id.to_string();

    let Some(extraction) = extractor.extract(&job.cycle).await else {
        debug!(cycle_id = %job.cycle.cycle_id, "chunker extracted nothing");
        return maybe_cross_boundary(counter, queue, job, &thread_id).await;
    };

    for draft in &extraction.gists {
        let gist = Gist {
            id: uuid::Uuid::new_v4(),
            thread_id: job.cycle.thread_id,
            content: draft.content.clone(),
            gist_type: draft.gist_type.clone(),
            confidence: draft.confidence,
            created_at: Utc::now(),
        };
        store.ephemeral.append_gist(&gist).await?;
    }

    for draft in &extraction.facts {
        let fact = Fact {
            key: draft.key.clone(),
            value: draft.value.clone(),
            confidence: draft.confidence,
            created_at: Utc::now(),
        };
        store.ephemeral.upsert_fact(&job.user_id, &fact).await?;
    }

    for draft in &extraction.traits {
        let user_trait = UserTrait {
            user_id: job.user_id.clone(),
            trait_key: draft.trait_key.clone(),
            trait_value: draft.trait_value.clone(),
            category: draft.category.clone(),
            confidence: draft.confidence,
            reinforcement_count: 0,
            last_reinforced_at: Utc::now(),
            last_conflict_at: None,
            is_literal: draft.is_literal,
            source: draft.source,
            embedding: None,
        };
        store.traits.upsert(user_trait).await?;
    }

    maybe_cross_boundary(counter, queue, job, &thread_id).await
}

async fn maybe_cross_boundary(
    counter: &ExchangeCounter,
    queue: &mut QueueClient,
    job: &ChunkerJob,
    thread_id: &str,
) -> Result<bool> {
    let exchange_count = counter.increment(thread_id).await?;
    let crossed = exchange_count >= EXCHANGES_PER_EPISODE || job.topic_changed;
    if crossed {
        let episodic_job = super::episodic::EpisodicJob {
            cycle: job.cycle.clone(),
            user_id: job.user_id.clone(),
        };
        queue.enqueue(names::EPISODIC, &episodic_job).await?;
        counter.reset(thread_id).await?;
        info!(thread_id, exchange_count, topic_changed = job.topic_changed, "episodic boundary crossed");
    }
    Ok(crossed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::types::CycleType;
    use crate::core::types::ThreadId;

    fn sample_job(topic_changed: bool) -> ChunkerJob {
        ChunkerJob {
            cycle: MessageCycle::root(ThreadId::new(), CycleType::User, "hello".into()),
            user_id: "user-1".into(),
            topic_changed,
        }
    }

    #[test]
    fn exchange_count_key_is_namespaced_per_thread() {
        let thread_id = "thread-abc";
        assert_eq!(keys::exchange_count(thread_id), "cortexd:exchange_count:thread-abc");
    }

    #[test]
    fn job_round_trips_through_json() {
        let job = sample_job(true);
        let json = serde_json::to_string(&job).expect("serializes");
        let back: ChunkerJob = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.user_id, job.user_id);
        assert!(back.topic_changed);
    }
}
