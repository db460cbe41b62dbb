//! In-memory [`VectorStore`] implementation for tests and embedded use.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity over all stored vectors. Every mutating call bumps a
//! write counter so callers can assert that a pass wrote nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;

use super::{VectorHit, VectorMetadata, VectorStore};

struct StoredVector {
    vector: Vec<f32>,
    metadata: VectorMetadata,
}

pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<String, StoredVector>>,
    writes: AtomicU64,
    available: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Number of upsert/delete calls that reached the store.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.read()
            .map(|v| v.contains_key(chunk_id))
            .unwrap_or(false)
    }

    /// Metadata of every stored vector for a source, ordered by ordinal.
    pub fn source_metadata(&self, source_id: &str) -> Vec<VectorMetadata> {
        let mut out: Vec<VectorMetadata> = self
            .read()
            .map(|v| {
                v.values()
                    .filter(|sv| sv.metadata.source_id == source_id)
                    .map(|sv| sv.metadata.clone())
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|m| m.ordinal);
        out
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store offline".to_string()))
        }
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, StoredVector>>, StoreError> {
        self.vectors
            .read()
            .map_err(|_| StoreError::Backend("vector map lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredVector>>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .write()
            .map_err(|_| StoreError::Backend("vector map lock poisoned".to_string()))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.write()?.insert(
            chunk_id.to_string(),
            StoredVector {
                vector: vector.to_vec(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.write()?
            .retain(|_, sv| sv.metadata.source_id != source_id);
        Ok(())
    }

    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<(), StoreError> {
        self.check_available()?;
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let mut vectors = self.write()?;
        for id in chunk_ids {
            vectors.remove(id);
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, StoreError> {
        self.check_available()?;
        let vectors = self.read()?;
        let mut hits: Vec<VectorHit> = vectors
            .iter()
            .map(|(id, sv)| VectorHit {
                chunk_id: id.clone(),
                metadata: sv.metadata.clone(),
                score: cosine_similarity(vector, &sv.vector) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
