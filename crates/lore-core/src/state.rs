//! Index bookkeeping and its persistence seam.
//!
//! [`IndexState`] records, per source, the content hash and chunk set that
//! were last written, plus the pass `generation`. It is owned by
//! [`LoreIndex`](crate::index::LoreIndex) and saved through a
//! [`StateStore`] so an unchanged corpus is not re-embedded on restart.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Chunk;

/// What the index knows about one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    pub content_hash: String,
    /// Chunks in ordinal order.
    pub chunks: Vec<Chunk>,
}

impl SourceState {
    /// Whether the stored chunk set is up to date for `content_hash`.
    ///
    /// With a `target` version every chunk must carry exactly that version;
    /// text-only chunks (failed or never embedded) are stale. Without one
    /// (vector path disabled) only the hash is compared.
    pub fn is_current(&self, content_hash: &str, target: Option<&str>) -> bool {
        if self.content_hash != content_hash {
            return false;
        }
        match target {
            Some(version) => self
                .chunks
                .iter()
                .all(|c| c.embedding_version.as_deref() == Some(version)),
            None => true,
        }
    }

    pub fn chunk_ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.chunk_id.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexState {
    pub generation: u64,
    pub sources: BTreeMap<String, SourceState>,
}

/// Durable storage for [`IndexState`].
///
/// Writes are per source so a crash mid-pass loses at most the document
/// in flight.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<IndexState>;

    async fn put_source(&self, source_id: &str, state: &SourceState) -> Result<()>;

    async fn remove_source(&self, source_id: &str) -> Result<()>;

    async fn set_generation(&self, generation: u64) -> Result<()>;
}

/// Process-local [`StateStore`]; state lives as long as the value does.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<IndexState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the saved state.
    pub fn snapshot(&self) -> Result<IndexState> {
        self.inner
            .lock()
            .map(|s| s.clone())
            .map_err(|_| anyhow!("state lock poisoned"))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<IndexState> {
        self.snapshot()
    }

    async fn put_source(&self, source_id: &str, state: &SourceState) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("state lock poisoned"))?;
        inner.sources.insert(source_id.to_string(), state.clone());
        Ok(())
    }

    async fn remove_source(&self, source_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("state lock poisoned"))?;
        inner.sources.remove(source_id);
        Ok(())
    }

    async fn set_generation(&self, generation: u64) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("state lock poisoned"))?;
        inner.generation = generation;
        Ok(())
    }
}
