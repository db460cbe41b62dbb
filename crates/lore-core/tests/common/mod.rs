//! Shared fixtures for the lore-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lore_core::chunk::ChunkerConfig;
use lore_core::embedding::EmbeddingProvider;
use lore_core::error::ProviderError;
use lore_core::index::{IndexConfig, LoreIndex};
use lore_core::lexical;
use lore_core::models::Document;
use lore_core::retrieval::{RetrievalConfig, RetrievalEngine};
use lore_core::retry::RetryPolicy;
use lore_core::state::MemoryStateStore;
use lore_core::error::StoreError;
use lore_core::store::memory::InMemoryVectorStore;
use lore_core::store::{VectorHit, VectorMetadata, VectorStore};
use tokio::sync::{Notify, Semaphore};

pub const DIMS: usize = 256;

/// Deterministic bag-of-words embedder.
///
/// Each lexical term is hashed into one of [`DIMS`] buckets. Failure modes
/// can be switched on at runtime.
pub struct TestEmbedder {
    model: String,
    calls: AtomicUsize,
    available: AtomicBool,
    delay_ms: AtomicU64,
    /// Texts containing this marker always fail transiently.
    fail_marker: Option<String>,
    /// Texts containing `.0` wait for a permit on `.1`.
    gate: Option<(String, Arc<Semaphore>)>,
    /// Signalled when a gated text starts waiting.
    pub entered: Arc<Notify>,
}

impl TestEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            delay_ms: AtomicU64::new(0),
            fail_marker: None,
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Block embedding of texts containing `marker` until the returned
    /// semaphore receives a permit.
    pub fn gated_on(mut self, marker: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some((marker.to_string(), gate.clone()));
        (self, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for TestEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("test provider offline".into()));
        }
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some((marker, gate)) = &self.gate {
            if text.contains(marker.as_str()) {
                self.entered.notify_one();
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|_| ProviderError::Unavailable("gate closed".into()))?;
            }
        }
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(ProviderError::Transient("poisoned text".into()));
            }
        }
        Ok(bag_of_words(text))
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for term in lexical::tokenize(text) {
        // FNV-1a
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in term.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    v
}

/// In-memory store that can hold an upsert after the vector is written,
/// freezing the index between vector write and publish.
pub struct GatedStore {
    inner: InMemoryVectorStore,
    /// Upserts for sources named here wait for a permit once written.
    source: std::sync::Mutex<Option<String>>,
    gate: Arc<Semaphore>,
    pub entered: Arc<Notify>,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryVectorStore::new(),
            source: std::sync::Mutex::new(None),
            gate: Arc::new(Semaphore::new(0)),
            entered: Arc::new(Notify::new()),
        }
    }

    /// Hold the next upserts for `source_id` until [`release`](Self::release).
    pub fn hold(&self, source_id: &str) {
        *self.source.lock().unwrap() = Some(source_id.to_string());
    }

    pub fn release(&self) {
        self.source.lock().unwrap().take();
        self.gate.add_permits(64);
    }
}

#[async_trait]
impl VectorStore for GatedStore {
    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> Result<(), StoreError> {
        self.inner.upsert(chunk_id, vector, metadata).await?;
        let held = self.source.lock().unwrap().as_deref() == Some(metadata.source_id.as_str());
        if held {
            self.entered.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| StoreError::Backend("gate closed".into()))?;
        }
        Ok(())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<(), StoreError> {
        self.inner.delete_by_source(source_id).await
    }

    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<(), StoreError> {
        self.inner.delete_chunks(chunk_ids).await
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, StoreError> {
        self.inner.search(vector, k).await
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        backoff: Duration::from_millis(1),
    }
}

pub fn index_config() -> IndexConfig {
    IndexConfig {
        chunker: ChunkerConfig::default(),
        retry: fast_retry(),
        concurrency: 4,
        vector_enabled: true,
    }
}

pub fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        min_score: 0.1,
        query_timeout: Duration::from_secs(2),
        retry: fast_retry(),
        ..RetrievalConfig::default()
    }
}

pub fn lore() -> Vec<Document> {
    vec![
        Document::new(
            "court.md",
            "The king holds court in the high hall. Petitioners wait for days.",
        ),
        Document::new(
            "dragons.md",
            "A dragon guards the keep on the northern ridge. Dragons hoard gold and sleep by day.",
        ),
        Document::new(
            "elves.md",
            "The elves of the silver wood sing to the moon. Their songs keep the forest young.",
        ),
    ]
}

/// Replace (or add) one document in a set.
pub fn with_doc(docs: &[Document], source_id: &str, content: &str) -> Vec<Document> {
    let mut out: Vec<Document> = docs
        .iter()
        .filter(|d| d.source_id != source_id)
        .cloned()
        .collect();
    out.push(Document::new(source_id, content));
    out
}

pub struct Harness {
    pub provider: Arc<TestEmbedder>,
    pub store: Arc<InMemoryVectorStore>,
    pub state: Arc<MemoryStateStore>,
    pub index: Arc<LoreIndex>,
    pub engine: RetrievalEngine,
}

impl Harness {
    pub async fn new(provider: TestEmbedder) -> Self {
        Self::open(
            Arc::new(provider),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MemoryStateStore::new()),
            retrieval_config(),
        )
        .await
    }

    pub async fn open(
        provider: Arc<TestEmbedder>,
        store: Arc<InMemoryVectorStore>,
        state: Arc<MemoryStateStore>,
        retrieval: RetrievalConfig,
    ) -> Self {
        let index = LoreIndex::open(
            IndexConfig {
                vector_enabled: retrieval.vector_enabled,
                ..index_config()
            },
            provider.clone(),
            store.clone(),
            state.clone(),
        )
        .await
        .unwrap();
        let engine = RetrievalEngine::new(retrieval, provider.clone(), store.clone(), index.reader());
        Self {
            provider,
            store,
            state,
            index: Arc::new(index),
            engine,
        }
    }

    /// Same stores and state, different provider: simulates a restart.
    pub async fn reopen(&self, provider: Arc<TestEmbedder>) -> Self {
        Self::open(
            provider,
            self.store.clone(),
            self.state.clone(),
            self.engine.config().clone(),
        )
        .await
    }
}
