//! Semantic Worker: extracts concepts and their relationships from an
//! episode's gist, reinforcing concepts that already exist instead of
//! duplicating them, and writes relationship edges into the concept graph
//! (§4.2, §4.8).
//!
//! Grounded on `memory::types::Concept::reinforce` for the strength/
//! consolidation-count update and on `graph::ConceptGraph::merge_edge`
//! for the relationship write.

use super::Result;
use crate::core::types::{ConceptId, EpisodeId, TopicId};
use crate::embeddings::SharedEmbeddingEngine;
use crate::graph::ConceptGraph;
use crate::memory::types::{Concept, ConceptRelationType};
use crate::memory::MemoryStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Injected so this module stays free of any specific LLM client, matching
/// the `act::Planner` injection shape.
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    async fn extract(&self, gist: &str) -> Vec<ConceptDraft>;
}

#[derive(Debug, Clone)]
pub struct ConceptDraft {
    pub concept_name: String,
    pub concept_type: String,
    pub definition: String,
    pub confidence: f32,
    pub relationships: Vec<RelationshipDraft>,
}

#[derive(Debug, Clone)]
pub struct RelationshipDraft {
    pub target_concept_name: String,
    pub relationship_type: ConceptRelationType,
    pub strength: f32,
}

/// Extracts no concepts. Keeps the semantic loop draining its queue when no
/// real extractor has been configured yet.
#[derive(Debug, Default)]
pub struct NullExtractor;

#[async_trait]
impl ConceptExtractor for NullExtractor {
    async fn extract(&self, _gist: &str) -> Vec<ConceptDraft> {
        Vec::new()
    }
}

/// The payload dequeued from [`crate::queues::names::SEMANTIC`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticJob {
    pub episode_id: EpisodeId,
    pub gist: String,
    pub topic: Option<TopicId>,
    pub user_id: String,
}

/// Extract concepts from `job.gist`, reinforcing any that already exist
/// by name and creating the rest, then merge their relationship edges.
/// Returns the ids of every concept touched.
///
/// # Errors
/// Returns [`super::WorkerError`] if a lookup, embed, insert, or edge
/// merge fails.
pub async fn process_job(
    store: &MemoryStore,
    embeddings: &SharedEmbeddingEngine,
    graph: &ConceptGraph,
    extractor: &dyn ConceptExtractor,
    job: &SemanticJob,
) -> Result<Vec<ConceptId>> {
    let drafts = extractor.extract(&job.gist).await;
    let mut by_name = std::collections::HashMap::new();

    for draft in &drafts {
        let concept_id = upsert_concept(store, embeddings, draft).await?;
        by_name.insert(draft.concept_name.clone(), concept_id);
    }

    for draft in &drafts {
        let Some(&source) = by_name.get(&draft.concept_name) else {
            continue;
        };
        for rel in &draft.relationships {
            let target = match by_name.get(&rel.target_concept_name) {
                Some(&id) => id,
                None => match store.concepts.find_by_name(&rel.target_concept_name).await? {
                    Some(existing) => existing.id,
                    None => continue,
                },
            };
            graph
                .merge_edge(source, target, rel.strength, rel.relationship_type)
                .await?;
        }
    }

    info!(episode_id = %job.episode_id, concepts = by_name.len(), "semantic consolidation complete");
    Ok(by_name.into_values().collect())
}

async fn upsert_concept(
    store: &MemoryStore,
    embeddings: &SharedEmbeddingEngine,
    draft: &ConceptDraft,
) -> Result<ConceptId> {
    if let Some(mut existing) = store.concepts.find_by_name(&draft.concept_name).await? {
        existing.reinforce(draft.confidence);
        existing.confidence = (existing.confidence + draft.confidence) / 2.0;
        store.concepts.insert(&existing).await?;
        return Ok(existing.id);
    }

    let embedding = {
        let mut engine = embeddings.write().await;
        engine.embed(&draft.definition)?
    };
    let mut concept = Concept::new(
        draft.concept_name.clone(),
        draft.concept_type.clone(),
        draft.definition.clone(),
        embedding,
    );
    concept.confidence = draft.confidence;
    concept.consolidation_count = 1;
    store.concepts.insert(&concept).await?;
    Ok(concept.id)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn job_round_trips_through_json() {
        let job = SemanticJob {
            episode_id: EpisodeId::new(),
            gist: "learned rust traits".into(),
            topic: None,
            user_id: "user-1".into(),
        };
        let json = serde_json::to_string(&job).expect("serializes");
        let back: SemanticJob = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.gist, job.gist);
    }
}
