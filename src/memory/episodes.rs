//! Durable episode store (Qdrant-backed), grounded on `MemoryDb::store_memory`
//! / `find_by_context` (§4.2: `insert`, `hybrid_search`).

use super::bm25::{hybrid_score, Bm25Index};
use super::qdrant_payload::{from_payload, to_payload_map};
use super::types::Episode;
use super::{collections, MemoryError, Result};
use crate::config::HYBRID_SEARCH_ALPHA;
use crate::core::types::TopicId;
use chrono::Utc;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::sync::Arc;
use tracing::warn;

pub async fn ensure_collection(client: &Qdrant, dimension: usize) -> Result<()> {
    let exists = client
        .collection_exists(collections::EPISODES)
        .await
        .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
    if !exists {
        client
            .create_collection(
                CreateCollectionBuilder::new(collections::EPISODES)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
    }
    Ok(())
}

pub struct EpisodeStore {
    client: Arc<Qdrant>,
    dimension: usize,
}

impl EpisodeStore {
    pub(super) fn new(client: Arc<Qdrant>, dimension: usize) -> Self {
        Self { client, dimension }
    }

    /// # Errors
    /// Returns [`MemoryError::DimensionMismatch`] if `vector`'s length
    /// doesn't match the configured embedding dimension, or
    /// [`MemoryError::VectorStore`] on a Qdrant failure.
    pub async fn insert(&self, episode: &Episode) -> Result<()> {
        if episode.embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: episode.embedding.len(),
            });
        }
        let payload_map = to_payload_map(episode)?;
        let point = PointStruct::new(episode.id.to_string(), episode.embedding.clone(), payload_map);
        self.client
            .upsert_points(UpsertPointsBuilder::new(collections::EPISODES, vec![point]).wait(true))
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(())
    }

    /// Vector-similarity search narrowed to a topic, re-ranked by BM25 over
    /// gist text and blended at `HYBRID_SEARCH_ALPHA` (§4.2).
    ///
    /// # Errors
    /// Returns [`MemoryError::DimensionMismatch`] if `query_vector`'s length
    /// doesn't match the configured embedding dimension.
    pub async fn hybrid_search(
        &self,
        query_vector: &[f32],
        query_text: &str,
        topic: Option<TopicId>,
        limit: usize,
    ) -> Result<Vec<(Episode, f32)>> {
        if query_vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }
        // Over-fetch by vector similarity so BM25 re-ranking has a real
        // candidate pool to work with.
        let fetch_limit = (limit * 4).max(20) as u64;
        let mut builder = SearchPointsBuilder::new(collections::EPISODES, query_vector.to_vec(), fetch_limit)
            .with_payload(true);
        if let Some(topic_id) = topic {
            builder =
                builder.filter(Filter::must([Condition::matches("topic", topic_id.to_string())]));
        }
        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;

        let mut episodes = Vec::new();
        let mut cosines = Vec::new();
        for scored in results.result {
            let Ok(episode) = from_payload::<Episode>(&scored.payload) else {
                continue;
            };
            cosines.push(f64::from(scored.score) as f32);
            episodes.push(episode);
        }

        let gists: Vec<String> = episodes.iter().map(|e| e.gist.clone()).collect();
        let bm25 = Bm25Index::build(&gists);
        let bm25_scores = bm25.normalized_scores(query_text);

        let mut blended: Vec<(Episode, f32)> = episodes
            .into_iter()
            .zip(cosines)
            .zip(bm25_scores)
            .map(|((episode, cosine), bm25_score)| {
                let score = hybrid_score(cosine, bm25_score, HYBRID_SEARCH_ALPHA);
                (episode, score)
            })
            .collect();

        blended.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        blended.truncate(limit);

        // Bump access tracking for every episode this read surfaces, before
        // handing the results back, so freshness re-basing (`freshness_at`)
        // sees the access.
        let now = Utc::now();
        for (episode, _) in &mut blended {
            episode.access_count += 1;
            episode.last_accessed_at = now;
            if let Err(e) = self.insert(episode).await {
                warn!(episode_id = %episode.id, error = %e, "failed to persist access-tracking update");
            }
        }

        Ok(blended)
    }

    /// Plain vector similarity search, no lexical re-ranking.
    ///
    /// # Errors
    /// Returns [`MemoryError::VectorStore`] on a Qdrant failure.
    pub async fn vector_search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<(Episode, f32)>> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collections::EPISODES, query_vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(results
            .result
            .into_iter()
            .filter_map(|scored| {
                from_payload::<Episode>(&scored.payload)
                    .ok()
                    .map(|e| (e, scored.score))
            })
            .collect())
    }

    /// Candidate episodes whose freshness has fallen below `threshold`, for
    /// the decay worker's sweep (§4.8).
    ///
    /// # Errors
    /// Returns [`MemoryError::VectorStore`] on a Qdrant failure.
    pub async fn scroll_by_freshness_below(&self, threshold: f32, limit: usize) -> Result<Vec<Episode>> {
        let filter = Filter::must([Condition::range(
            "freshness",
            qdrant_client::qdrant::Range {
                lt: Some(f64::from(threshold)),
                ..Default::default()
            },
        )]);
        let result = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collections::EPISODES)
                    .filter(filter)
                    .limit(limit as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(result
            .result
            .into_iter()
            .filter_map(|point| from_payload::<Episode>(&point.payload).ok())
            .collect())
    }

    /// Scroll up to `limit` episodes with no filter, for the decay worker's
    /// full sweep (§4.8). `offset` is the last point id seen, for paging.
    ///
    /// # Errors
    /// Returns [`MemoryError::VectorStore`] on a Qdrant failure.
    pub async fn scroll_all(&self, limit: usize) -> Result<Vec<Episode>> {
        let result = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collections::EPISODES)
                    .limit(limit as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        Ok(result
            .result
            .into_iter()
            .filter_map(|point| from_payload::<Episode>(&point.payload).ok())
            .collect())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn fetch_limit_over_fetches_relative_to_requested_limit() {
        let limit: usize = 5;
        let fetch_limit = (limit * 4).max(20) as u64;
        assert_eq!(fetch_limit, 20);
    }
}
