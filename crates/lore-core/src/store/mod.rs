//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the only contract the engine needs from a
//! vector database: upsert by chunk ID, delete by source or by ID, and
//! k-nearest-neighbor search. Implementations must be `Send + Sync`.
//!
//! [`LoreIndex`](crate::index::LoreIndex) is the only writer; the
//! [`RetrievalEngine`](crate::retrieval::RetrievalEngine) only searches.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub source_id: String,
    pub ordinal: u32,
    pub embedding_version: String,
}

/// One nearest-neighbor result.
///
/// Carries the metadata stored with the vector so readers can check the
/// hit against the chunk version they hold.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub metadata: VectorMetadata,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f64,
}

/// Abstract vector backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or replace the vector for a chunk |
/// | [`delete_by_source`](VectorStore::delete_by_source) | Drop every vector of a document |
/// | [`delete_chunks`](VectorStore::delete_chunks) | Drop specific chunk vectors |
/// | [`search`](VectorStore::search) | Top-`k` by cosine similarity, descending |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> Result<(), StoreError>;

    async fn delete_by_source(&self, source_id: &str) -> Result<(), StoreError>;

    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<(), StoreError>;

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, StoreError>;
}
