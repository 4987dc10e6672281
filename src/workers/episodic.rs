//! Episodic Worker: synthesizes an [`Episode`] from the gists a thread
//! accumulated since the last boundary, computes its salience, persists
//! it, and enqueues the semantic consolidation job (§4.8).
//!
//! Grounded on `actors::thought`'s assembly-then-persist shape and on
//! `memory::types::SalienceWeights::composite` for the salience formula
//! this worker is the sole caller of outside tests.

use super::Result;
use crate::config::SalienceWeights;
use crate::core::types::EpisodeId;
use crate::embeddings::SharedEmbeddingEngine;
use crate::memory::types::{Emotion, Episode, EpisodeContext, Intent, MessageCycle, SalienceFactors};
use crate::memory::MemoryStore;
use crate::queues::{names, QueueClient};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Injected so this module stays free of any specific LLM client, matching
/// the `act::Planner` injection shape.
#[async_trait]
pub trait EpisodeSynthesizer: Send + Sync {
    /// Returns `None` when the accumulated gists don't warrant a durable
    /// episode (e.g. nothing but acknowledgements).
    async fn synthesize(&self, gists: &[crate::memory::types::Gist], cycle: &MessageCycle) -> Option<EpisodeDraft>;
}

#[derive(Debug, Clone)]
pub struct EpisodeDraft {
    pub gist: String,
    pub intent: Intent,
    pub context: EpisodeContext,
    pub action: Option<String>,
    pub emotion: Emotion,
    pub outcome: Option<String>,
    pub open_loops: Vec<String>,
    pub salience_factors: SalienceFactors,
}

/// Synthesizes nothing. Keeps the episodic loop draining its queue when no
/// real synthesizer has been configured yet.
#[derive(Debug, Default)]
pub struct NullSynthesizer;

#[async_trait]
impl EpisodeSynthesizer for NullSynthesizer {
    async fn synthesize(
        &self,
        _gists: &[crate::memory::types::Gist],
        _cycle: &MessageCycle,
    ) -> Option<EpisodeDraft> {
        None
    }
}

/// The payload dequeued from [`names::EPISODIC`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicJob {
    pub cycle: MessageCycle,
    pub user_id: String,
}

/// Synthesize and persist one episode from `job`'s thread, then enqueue
/// semantic consolidation. Returns `None` if the synthesizer found nothing
/// worth a durable episode.
///
/// # Errors
/// Returns [`WorkerError`] if reading gists, embedding the gist text,
/// inserting the episode, or the semantic enqueue fails.
pub async fn process_job(
    store: &MemoryStore,
    embeddings: &SharedEmbeddingEngine,
    synthesizer: &dyn EpisodeSynthesizer,
    salience_weights: &SalienceWeights,
    queue: &mut QueueClient,
    job: &EpisodicJob,
) -> Result<Option<EpisodeId>> {
    let gists = store
        .ephemeral
        .gists_for_thread(&job.cycle.thread_id.to_string())
        .await?;

    let Some(draft) = synthesizer.synthesize(&gists, &job.cycle).await else {
        debug!(thread_id = %job.cycle.thread_id, "episodic worker found nothing worth persisting");
        return Ok(None);
    };

    let salience = salience_weights.composite(
        draft.salience_factors.emotional,
        draft.salience_factors.commitment,
        draft.salience_factors.novelty,
        draft.salience_factors.unresolved,
    );

    let embedding = {
        let mut engine = embeddings.write().await;
        engine.embed(&draft.gist)?
    };

    let now = Utc::now();
    let episode = Episode {
        id: EpisodeId::new(),
        topic: job.cycle.topic,
        gist: draft.gist,
        intent: draft.intent,
        context: draft.context,
        action: draft.action,
        emotion: draft.emotion,
        outcome: draft.outcome,
        open_loops: draft.open_loops,
        salience_factors: draft.salience_factors,
        salience,
        freshness: salience,
        embedding,
        access_count: 0,
        created_at: now,
        last_accessed_at: now,
    };
    store.episodes.insert(&episode).await?;

    let semantic_job = super::semantic::SemanticJob {
        episode_id: episode.id,
        gist: episode.gist.clone(),
        topic: episode.topic,
        user_id: job.user_id.clone(),
    };
    queue.enqueue(names::SEMANTIC, &semantic_job).await?;
    info!(episode_id = %episode.id, thread_id = %job.cycle.thread_id, "episode persisted");

    Ok(Some(episode.id))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::SalienceWeights;

    #[test]
    fn salience_composite_weights_unresolved_least_by_default() {
        let weights = SalienceWeights::default_spec();
        let high_unresolved = weights.composite(0.0, 0.0, 0.0, 1.0);
        let high_emotional = weights.composite(1.0, 0.0, 0.0, 0.0);
        assert!(high_emotional > high_unresolved);
    }

    #[test]
    fn job_round_trips_through_json() {
        use crate::core::types::ThreadId;
        use crate::memory::types::CycleType;
        let job = EpisodicJob {
            cycle: MessageCycle::root(ThreadId::new(), CycleType::User, "content".into()),
            user_id: "user-1".into(),
        };
        let json = serde_json::to_string(&job).expect("serializes");
        let back: EpisodicJob = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.user_id, job.user_id);
    }
}
