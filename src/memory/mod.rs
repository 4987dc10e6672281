//! Layered memory: ephemeral stores (working memory, gists, facts, traits,
//! moments) backed by Redis, and durable stores (episodes, concepts) backed
//! by the vector database, unified behind [`MemoryStore`] (§3, §4.2).

pub mod bm25;
pub mod concepts;
pub mod ephemeral;
pub mod episodes;
mod qdrant_payload;
pub mod traits_store;
pub mod types;

pub use concepts::ConceptStore;
pub use ephemeral::EphemeralStore;
pub use episodes::EpisodeStore;
pub use traits_store::TraitStore;

use qdrant_client::Qdrant;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("ephemeral store error: {0}")]
    Ephemeral(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, MemoryError>;

pub mod collections {
    pub const EPISODES: &str = "cortexd_episodes";
    pub const CONCEPTS: &str = "cortexd_concepts";
}

/// Bundles the ephemeral (Redis) and durable (Qdrant) layers behind one
/// handle, mirroring the teacher's single `MemoryDb` entry point.
pub struct MemoryStore {
    pub episodes: EpisodeStore,
    pub concepts: ConceptStore,
    pub ephemeral: EphemeralStore,
    pub traits: TraitStore,
}

impl MemoryStore {
    /// Connect to both backing stores and ensure collections exist.
    ///
    /// # Errors
    /// Returns [`MemoryError::VectorStore`] if the Qdrant connection or
    /// collection setup fails, or [`MemoryError::Ephemeral`] if the Redis
    /// connection fails.
    pub async fn connect(qdrant_url: &str, redis_url: &str, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(qdrant_url)
            .build()
            .map_err(|e| MemoryError::VectorStore(e.to_string()))?;
        let client = Arc::new(client);

        episodes::ensure_collection(&client, dimension).await?;
        concepts::ensure_collection(&client, dimension).await?;

        let ephemeral = EphemeralStore::connect(redis_url).await?;

        Ok(Self {
            episodes: EpisodeStore::new(client.clone(), dimension),
            concepts: ConceptStore::new(client, dimension),
            ephemeral: ephemeral.clone(),
            traits: TraitStore::new(ephemeral),
        })
    }
}
