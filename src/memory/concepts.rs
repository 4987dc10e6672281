//! Durable concept store (Qdrant-backed) plus spreading activation over the
//! concept graph (§4.2: `insert`, `vector_search`, `spread_activation`).

use super::qdrant_payload::{from_payload, to_payload_map};
use super::{collections, MemoryError, Result};
use crate::config::SpreadingConfig;
use crate::core::types::ConceptId;
use crate::graph::ConceptGraph;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::types::Concept;

pub async fn ensure_collection(client: &Qdrant, dimension: usize) -> Result<()> {
    let exists = client
        .collection_exists(collections::CONCEPTS)
        .await
        .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
    if !exists {
        client
            .create_collection(
                CreateCollectionBuilder::new(collections::CONCEPTS)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
    }
    Ok(())
}

pub struct ConceptStore {
    client: Arc<Qdrant>,
    dimension: usize,
}

impl ConceptStore {
    pub(super) fn new(client: Arc<Qdrant>, dimension: usize) -> Self {
        Self { client, dimension }
    }

    /// # Errors
    /// Returns [`MemoryError::DimensionMismatch`] if `concept.embedding`'s
    /// length doesn't match the configured dimension.
    pub async fn insert(&self, concept: &Concept) -> Result<()> {
        if concept.embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: concept.embedding.len(),
            });
        }
        let payload_map = to_payload_map(concept)?;
        let point = PointStruct::new(concept.id.to_string(), concept.embedding.clone(), payload_map);
        self.client
            .upsert_points(UpsertPointsBuilder::new(collections::CONCEPTS, vec![point]).wait(true))
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`MemoryError::VectorStore`] on a Qdrant failure.
    pub async fn vector_search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<(Concept, f32)>> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collections::CONCEPTS, query_vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(results
            .result
            .into_iter()
            .filter_map(|scored| {
                from_payload::<Concept>(&scored.payload)
                    .ok()
                    .map(|c| (c, scored.score))
            })
            .collect())
    }

    /// BFS spreading activation from `seeds` over `graph`, applying
    /// [`SpreadingConfig::decay`] per level and stopping at
    /// [`SpreadingConfig::min_weight`] or [`SpreadingConfig::depth`]
    /// (§4.2, §4.3).
    ///
    /// # Errors
    /// Returns [`MemoryError::VectorStore`] if fetching graph edges fails.
    pub async fn spread_activation(
        &self,
        graph: &ConceptGraph,
        seeds: &[(ConceptId, f32)],
        config: &SpreadingConfig,
    ) -> Result<HashMap<ConceptId, f32>> {
        let mut activation: HashMap<ConceptId, f32> = HashMap::new();
        let mut queue: VecDeque<(ConceptId, f32, u8)> = VecDeque::new();

        for &(id, weight) in seeds {
            activation
                .entry(id)
                .and_modify(|w| *w = combine(*w, weight, &config.aggregation))
                .or_insert(weight);
            queue.push_back((id, weight, 0));
        }

        while let Some((concept_id, weight, depth)) = queue.pop_front() {
            if depth >= config.depth || weight < config.min_weight {
                continue;
            }
            let edges = graph
                .neighbors(concept_id, config.bidirectional)
                .await
                .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
            for edge in edges {
                let propagated = (weight * config.decay * edge.strength).min(config.max_activation);
                if propagated < config.min_weight {
                    continue;
                }
                let updated = activation
                    .entry(edge.target)
                    .and_modify(|w| *w = combine(*w, propagated, &config.aggregation))
                    .or_insert(propagated);
                queue.push_back((edge.target, *updated, depth + 1));
            }
        }

        Ok(activation)
    }

    /// Exact lookup by `concept_name`, for the semantic worker's
    /// reinforce-or-create decision (§4.8).
    ///
    /// # Errors
    /// Returns [`MemoryError::VectorStore`] on a Qdrant failure.
    pub async fn find_by_name(&self, concept_name: &str) -> Result<Option<Concept>> {
        let filter = Filter::must([Condition::matches("concept_name", concept_name.to_string())]);
        let result = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collections::CONCEPTS)
                    .filter(filter)
                    .limit(1)
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(result
            .result
            .into_iter()
            .next()
            .and_then(|point| from_payload::<Concept>(&point.payload).ok()))
    }

    /// Scroll up to `limit` concepts with no filter, for the decay worker's
    /// full sweep (§4.8).
    ///
    /// # Errors
    /// Returns [`MemoryError::VectorStore`] on a Qdrant failure.
    pub async fn scroll_all(&self, limit: usize) -> Result<Vec<Concept>> {
        let result = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collections::CONCEPTS)
                    .limit(limit as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(result
            .result
            .into_iter()
            .filter_map(|point| from_payload::<Concept>(&point.payload).ok())
            .collect())
    }
}

fn combine(current: f32, incoming: f32, aggregation: &crate::config::SpreadingAggregation) -> f32 {
    match aggregation {
        crate::config::SpreadingAggregation::Max => current.max(incoming),
        crate::config::SpreadingAggregation::Sum => current + incoming,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::SpreadingAggregation;

    #[test]
    fn max_aggregation_keeps_higher_weight() {
        assert_eq!(combine(0.3, 0.7, &SpreadingAggregation::Max), 0.7);
    }

    #[test]
    fn sum_aggregation_adds_weights() {
        assert!((combine(0.3, 0.2, &SpreadingAggregation::Sum) - 0.5).abs() < 1e-6);
    }
}
