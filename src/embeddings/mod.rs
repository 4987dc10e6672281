//! Text embeddings for memory entries, generated via FastEmbed.
//!
//! The target dimension is resolved at boot from the vector store (an
//! existing collection's configured size) rather than hardcoded, falling
//! back to [`DEFAULT_DIMENSION`] on a fresh store (§9 open question:
//! embedding dimension).

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Compiled fallback when no collection exists yet to introspect.
pub const DEFAULT_DIMENSION: usize = 768;

pub struct EmbeddingEngine {
    model: fastembed::TextEmbedding,
    dimension: usize,
    embed_count: u64,
}

pub type SharedEmbeddingEngine = Arc<RwLock<EmbeddingEngine>>;

impl EmbeddingEngine {
    /// Load the embedding model. Downloads on first run (~90MB,
    /// `all-MiniLM-L6-v2`, 384-dim native output).
    ///
    /// # Errors
    /// Returns [`EmbeddingError::InitFailed`] if model download or
    /// initialization fails.
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        info!("initializing embedding engine (all-MiniLM-L6-v2)");

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        info!(dimension, "embedding engine ready");

        Ok(Self {
            model,
            dimension,
            embed_count: 0,
        })
    }

    /// Resolve the target dimension from an existing Qdrant collection's
    /// vector config, falling back to [`DEFAULT_DIMENSION`] if the
    /// collection doesn't exist yet.
    ///
    /// # Errors
    /// Returns [`EmbeddingError::InitFailed`] if the Qdrant query itself
    /// fails (not if the collection is simply absent).
    pub async fn resolve_dimension(
        client: &qdrant_client::Qdrant,
        collection: &str,
    ) -> Result<usize, EmbeddingError> {
        let exists = client
            .collection_exists(collection)
            .await
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
        if !exists {
            return Ok(DEFAULT_DIMENSION);
        }
        let info = client
            .collection_info(collection)
            .await
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|vc| vc.config)
            .and_then(|config| match config {
                qdrant_client::qdrant::vectors_config::Config::Params(p) => Some(p.size as usize),
                qdrant_client::qdrant::vectors_config::Config::ParamsMap(_) => None,
            })
            .unwrap_or(DEFAULT_DIMENSION);
        Ok(size)
    }

    /// Embed a single piece of text, padded/truncated to the resolved
    /// dimension.
    ///
    /// # Errors
    /// Returns [`EmbeddingError::EmptyInput`] for empty text, or
    /// [`EmbeddingError::EmbedFailed`] if inference fails.
    pub fn embed(&mut self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::EmbedFailed(e.to_string()))?;

        let raw_vector = embeddings.into_iter().next().ok_or(EmbeddingError::NoOutput)?;
        let vector = pad_to_dimension(raw_vector, self.dimension);

        self.embed_count += 1;
        if self.embed_count % 1000 == 0 {
            debug!(count = self.embed_count, "embedded entries");
        }

        Ok(vector)
    }

    /// # Errors
    /// Returns [`EmbeddingError::EmbedFailed`] if inference fails.
    pub fn embed_batch(&mut self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let embeddings = self
            .model
            .embed(texts, None)
            .map_err(|e| EmbeddingError::EmbedFailed(e.to_string()))?;

        let vectors: Vec<Vec<f32>> = embeddings
            .into_iter()
            .map(|v| pad_to_dimension(v, self.dimension))
            .collect();

        self.embed_count += vectors.len() as u64;
        Ok(vectors)
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub const fn embed_count(&self) -> u64 {
        self.embed_count
    }
}

fn pad_to_dimension(mut vector: Vec<f32>, target_dim: usize) -> Vec<f32> {
    if vector.len() < target_dim {
        vector.resize(target_dim, 0.0);
    } else if vector.len() > target_dim {
        vector.truncate(target_dim);
    }
    vector
}

/// # Errors
/// Returns [`EmbeddingError::InitFailed`] if model load fails.
pub fn create_embedding_engine(dimension: usize) -> Result<SharedEmbeddingEngine, EmbeddingError> {
    let engine = EmbeddingEngine::new(dimension)?;
    Ok(Arc::new(RwLock::new(engine)))
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("failed to initialize embedding model: {0}")]
    InitFailed(String),

    #[error("empty input text")]
    EmptyInput,

    #[error("failed to generate embedding: {0}")]
    EmbedFailed(String),

    #[error("no embedding output generated")]
    NoOutput,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn pad_to_dimension_pads_short_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let padded = pad_to_dimension(v, 5);
        assert_eq!(padded, vec![1.0, 2.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn pad_to_dimension_truncates_long_vectors() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let padded = pad_to_dimension(v, 3);
        assert_eq!(padded, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn pad_to_dimension_preserves_exact_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let padded = pad_to_dimension(v, 3);
        assert_eq!(padded, vec![1.0, 2.0, 3.0]);
    }
}
