//! Incremental lore index.
//!
//! [`LoreIndex`] keeps the vector store and the published [`Corpus`] in step
//! with a set of source documents. A pass ([`LoreIndex::reconcile`]) skips
//! documents whose content hash and embedding version are unchanged,
//! re-chunks and re-embeds the rest, and drops sources that disappeared.
//!
//! # Write order per document
//!
//! 1. Embed every chunk (bounded concurrency, retry on transient errors).
//! 2. Upsert the new vectors.
//! 3. Publish the new chunk set to the corpus (one swap).
//! 4. Delete vectors of chunk IDs that are no longer embedded.
//! 5. Persist the document's [`SourceState`].
//!
//! A reader therefore never sees a published embedded chunk without a
//! vector, and never sees a mix of old and new chunks for one document.
//! A store failure in step 2 leaves the document's previous state live.
//!
//! The pass `generation` advances once per pass that changed anything.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chunk::{self, ChunkerConfig};
use crate::corpus::{Corpus, CorpusReader, CorpusWriter};
use crate::embedding::{embedding_version, EmbeddingProvider};
use crate::error::{IndexError, ProviderError};
use crate::models::{Chunk, Document};
use crate::retry::RetryPolicy;
use crate::state::{IndexState, SourceState, StateStore};
use crate::store::{VectorMetadata, VectorStore};

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub chunker: ChunkerConfig,
    pub retry: RetryPolicy,
    /// Maximum in-flight embedding calls per document.
    pub concurrency: usize,
    /// When false, chunks are indexed text-only and the provider is never
    /// called.
    pub vector_enabled: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            retry: RetryPolicy::default(),
            concurrency: 4,
            vector_enabled: true,
        }
    }
}

/// What a pass did with one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// Hash and embedding version matched; nothing was written.
    Unchanged,
    /// Re-chunked and written. `text_only` chunks failed to embed and stay
    /// stale until the next pass.
    Reembedded {
        chunks: usize,
        embedded: usize,
        text_only: usize,
    },
    /// Nothing usable was written for the new content.
    Failed { reason: String },
    /// Source was absent from the pass and has been dropped.
    Removed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    #[serde(flatten)]
    pub outcome: DocumentOutcome,
}

/// Result of one reconcile or rebuild pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Generation after the pass.
    pub generation: u64,
    pub outcomes: Vec<SourceOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconcileReport {
    pub fn outcome(&self, source_id: &str) -> Option<&DocumentOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.source_id == source_id)
            .map(|o| &o.outcome)
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Unchanged))
    }

    pub fn reembedded(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Reembedded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Failed { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Removed))
    }

    /// Chunks written without a vector across the pass.
    pub fn text_only_chunks(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.outcome {
                DocumentOutcome::Reembedded { text_only, .. } => text_only,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&DocumentOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

/// Clears the running flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Ingested {
    outcome: DocumentOutcome,
    /// State to persist, or `None` to keep the previous state.
    next_state: Option<SourceState>,
    published: bool,
}

impl Ingested {
    fn failed(reason: String) -> Self {
        Self {
            outcome: DocumentOutcome::Failed { reason },
            next_state: None,
            published: false,
        }
    }
}

pub struct LoreIndex {
    config: IndexConfig,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    state_store: Arc<dyn StateStore>,
    state: Mutex<IndexState>,
    corpus: CorpusWriter,
    running: AtomicBool,
}

impl LoreIndex {
    /// Load saved state and publish it as the initial corpus.
    pub async fn open(
        config: IndexConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        state_store: Arc<dyn StateStore>,
    ) -> anyhow::Result<Self> {
        let state = state_store
            .load()
            .await
            .context("failed to load index state")?;
        info!(
            sources = state.sources.len(),
            generation = state.generation,
            "loaded index state"
        );
        let corpus = CorpusWriter::new(Corpus::from_state(&state));
        Ok(Self {
            config,
            provider,
            store,
            state_store,
            state: Mutex::new(state),
            corpus,
            running: AtomicBool::new(false),
        })
    }

    /// Handle for readers of the published corpus.
    pub fn reader(&self) -> CorpusReader {
        self.corpus.reader()
    }

    pub fn generation(&self) -> u64 {
        self.corpus.snapshot().generation()
    }

    pub fn is_reconciling(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Copy of the in-memory state. Waits for a running pass to finish.
    pub async fn state(&self) -> IndexState {
        self.state.lock().await.clone()
    }

    /// Version new vectors would be stamped with, if vectors are produced.
    fn vector_identity(&self) -> Option<String> {
        (self.config.vector_enabled && self.provider.is_enabled())
            .then(|| self.provider.model_identity())
    }

    /// Bring the index in line with `documents`.
    ///
    /// Sources not in `documents` are removed. Per-document failures are
    /// reported in the outcome list; only a state-persistence failure or a
    /// concurrent pass fails the call.
    pub async fn reconcile(&self, documents: &[Document]) -> Result<ReconcileReport, IndexError> {
        self.run_pass(documents, false).await
    }

    /// Like [`reconcile`](Self::reconcile) but re-chunks and re-embeds every
    /// document regardless of hashes.
    pub async fn rebuild(&self, documents: &[Document]) -> Result<ReconcileReport, IndexError> {
        self.run_pass(documents, true).await
    }

    async fn run_pass(
        &self,
        documents: &[Document],
        force: bool,
    ) -> Result<ReconcileReport, IndexError> {
        let _guard = PassGuard::acquire(&self.running).ok_or(IndexError::ReconcileInProgress)?;
        let started_at = Utc::now();
        let identity = self.vector_identity();
        let mut state = self.state.lock().await;
        let mut outcomes = Vec::with_capacity(documents.len());
        let mut seen: HashSet<&str> = HashSet::new();
        let mut changed = false;

        info!(
            documents = documents.len(),
            force,
            vectors = identity.is_some(),
            "starting reconcile pass"
        );

        for doc in documents {
            if !seen.insert(doc.source_id.as_str()) {
                warn!(source_id = %doc.source_id, "duplicate source in pass, keeping first");
                continue;
            }
            let target = identity
                .as_deref()
                .map(|id| embedding_version(id, &doc.content_hash));
            let previous = state.sources.get(&doc.source_id);

            if !force {
                if let Some(prev) = previous {
                    if prev.is_current(&doc.content_hash, target.as_deref()) {
                        debug!(source_id = %doc.source_id, "unchanged");
                        outcomes.push(SourceOutcome {
                            source_id: doc.source_id.clone(),
                            outcome: DocumentOutcome::Unchanged,
                        });
                        continue;
                    }
                }
            }

            let ingested = self.ingest(doc, previous, target.as_deref()).await;
            changed |= ingested.published;
            if let Some(next) = ingested.next_state {
                self.state_store
                    .put_source(&doc.source_id, &next)
                    .await
                    .map_err(IndexError::State)?;
                state.sources.insert(doc.source_id.clone(), next);
            }
            outcomes.push(SourceOutcome {
                source_id: doc.source_id.clone(),
                outcome: ingested.outcome,
            });
        }

        let missing: Vec<String> = state
            .sources
            .keys()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();
        for source_id in missing {
            let outcome = self.remove(&mut state, &source_id).await?;
            changed |= outcome == DocumentOutcome::Removed;
            outcomes.push(SourceOutcome { source_id, outcome });
        }

        if changed || force {
            let next = state.generation + 1;
            self.state_store
                .set_generation(next)
                .await
                .map_err(IndexError::State)?;
            state.generation = next;
            self.corpus.publish(|c| c.with_generation(next));
        }

        let report = ReconcileReport {
            generation: state.generation,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            generation = report.generation,
            unchanged = report.unchanged(),
            reembedded = report.reembedded(),
            failed = report.failed(),
            removed = report.removed(),
            text_only = report.text_only_chunks(),
            "reconcile pass finished"
        );
        Ok(report)
    }

    async fn ingest(
        &self,
        doc: &Document,
        previous: Option<&SourceState>,
        target: Option<&str>,
    ) -> Ingested {
        let chunks = chunk::split(doc, &self.config.chunker);
        let total = chunks.len();

        let (embedded, last_error) = match target {
            Some(version) => self.embed_chunks(chunks, version).await,
            None => (chunks.into_iter().map(|c| (c, None)).collect(), None),
        };

        for (chunk, vector) in &embedded {
            let (Some(vector), Some(version)) = (vector, &chunk.embedding_version) else {
                continue;
            };
            let metadata = VectorMetadata {
                source_id: chunk.source_id.clone(),
                ordinal: chunk.ordinal,
                embedding_version: version.clone(),
            };
            let result = self
                .config
                .retry
                .run("vector upsert", || {
                    self.store.upsert(&chunk.chunk_id, vector, &metadata)
                })
                .await;
            if let Err(e) = result {
                warn!(source_id = %doc.source_id, error = %e, "vector upsert failed, keeping previous version");
                return Ingested::failed(e.to_string());
            }
        }

        let new_chunks: Vec<Chunk> = embedded.into_iter().map(|(c, _)| c).collect();
        let published = SourceState {
            content_hash: doc.content_hash.clone(),
            chunks: new_chunks.clone(),
        };
        self.corpus
            .publish(|c| c.with_source(&doc.source_id, Some(published)));

        let keep: HashSet<&str> = new_chunks
            .iter()
            .filter(|c| c.is_embedded())
            .map(|c| c.chunk_id.as_str())
            .collect();
        let stale: Vec<String> = previous
            .map(|p| {
                p.chunks
                    .iter()
                    .filter(|c| c.is_embedded() && !keep.contains(c.chunk_id.as_str()))
                    .map(|c| c.chunk_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        if !stale.is_empty() {
            let result = self
                .config
                .retry
                .run("vector delete", || self.store.delete_chunks(&stale))
                .await;
            if let Err(e) = result {
                // Previous state stays recorded so the next pass retries the delete.
                warn!(source_id = %doc.source_id, stale = stale.len(), error = %e, "failed to delete stale vectors");
                return Ingested {
                    published: true,
                    ..Ingested::failed(e.to_string())
                };
            }
        }

        let embedded_count = keep.len();
        let outcome = if target.is_some() && total > 0 && embedded_count == 0 {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no chunk could be embedded".to_string());
            warn!(source_id = %doc.source_id, %reason, "document indexed text-only");
            DocumentOutcome::Failed { reason }
        } else {
            debug!(source_id = %doc.source_id, chunks = total, embedded = embedded_count, "indexed");
            DocumentOutcome::Reembedded {
                chunks: total,
                embedded: embedded_count,
                text_only: total - embedded_count,
            }
        };

        Ingested {
            outcome,
            next_state: Some(SourceState {
                content_hash: doc.content_hash.clone(),
                chunks: new_chunks,
            }),
            published: true,
        }
    }

    /// Embed chunks with bounded concurrency. Successful chunks get
    /// `embedding_version` stamped; failed ones stay text-only.
    async fn embed_chunks(
        &self,
        chunks: Vec<Chunk>,
        version: &str,
    ) -> (Vec<(Chunk, Option<Vec<f32>>)>, Option<ProviderError>) {
        let expected_dims = self.provider.dims();
        let results: Vec<(Chunk, Result<Vec<f32>, ProviderError>)> =
            stream::iter(chunks.into_iter().map(|chunk| async move {
                let result = self
                    .config
                    .retry
                    .run("embed chunk", || self.provider.embed(&chunk.text))
                    .await
                    .and_then(|v| {
                        if expected_dims > 0 && v.len() != expected_dims {
                            Err(ProviderError::Unavailable(format!(
                                "expected {} dimensions, got {}",
                                expected_dims,
                                v.len()
                            )))
                        } else {
                            Ok(v)
                        }
                    });
                (chunk, result)
            }))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut last_error = None;
        let embedded = results
            .into_iter()
            .map(|(mut chunk, result)| match result {
                Ok(vector) => {
                    chunk.embedding_version = Some(version.to_string());
                    (chunk, Some(vector))
                }
                Err(e) => {
                    warn!(
                        source_id = %chunk.source_id,
                        ordinal = chunk.ordinal,
                        error = %e,
                        "chunk left text-only"
                    );
                    last_error = Some(e);
                    (chunk, None)
                }
            })
            .collect();
        (embedded, last_error)
    }

    async fn remove(
        &self,
        state: &mut IndexState,
        source_id: &str,
    ) -> Result<DocumentOutcome, IndexError> {
        let result = self
            .config
            .retry
            .run("vector delete", || self.store.delete_by_source(source_id))
            .await;
        if let Err(e) = result {
            warn!(source_id, error = %e, "failed to remove source vectors");
            return Ok(DocumentOutcome::Failed {
                reason: e.to_string(),
            });
        }
        self.corpus.publish(|c| c.with_source(source_id, None));
        self.state_store
            .remove_source(source_id)
            .await
            .map_err(IndexError::State)?;
        state.sources.remove(source_id);
        debug!(source_id, "removed");
        Ok(DocumentOutcome::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use crate::store::memory::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Two-dimensional embedder: counts of 'a' and 'e'.
    struct VowelEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for VowelEmbedder {
        fn model_name(&self) -> &str {
            "vowels"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let a = text.matches('a').count() as f32;
            let e = text.matches('e').count() as f32;
            Ok(vec![a + 1.0, e + 1.0])
        }
    }

    fn config() -> IndexConfig {
        IndexConfig {
            retry: RetryPolicy {
                max_retries: 1,
                backoff: Duration::from_millis(1),
            },
            ..IndexConfig::default()
        }
    }

    async fn index() -> (LoreIndex, Arc<VowelEmbedder>, Arc<InMemoryVectorStore>) {
        let provider = Arc::new(VowelEmbedder {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryVectorStore::new());
        let index = LoreIndex::open(
            config(),
            provider.clone(),
            store.clone(),
            Arc::new(MemoryStateStore::new()),
        )
        .await
        .unwrap();
        (index, provider, store)
    }

    #[tokio::test]
    async fn test_first_pass_embeds_everything() {
        let (index, _, store) = index().await;
        let docs = vec![
            Document::new("a.md", "alpha"),
            Document::new("b.md", "beta"),
        ];
        let report = index.reconcile(&docs).await.unwrap();
        assert_eq!(report.reembedded(), 2);
        assert_eq!(report.generation, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(index.reader().snapshot().embedded_count(), 2);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let (index, provider, store) = index().await;
        let docs = vec![Document::new("a.md", "alpha")];
        index.reconcile(&docs).await.unwrap();
        let writes = store.write_count();
        let calls = provider.calls.load(Ordering::SeqCst);

        let report = index.reconcile(&docs).await.unwrap();
        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.generation, 1);
        assert_eq!(store.write_count(), writes);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_rebuild_forces_reembedding() {
        let (index, provider, _) = index().await;
        let docs = vec![Document::new("a.md", "alpha")];
        index.reconcile(&docs).await.unwrap();
        let report = index.rebuild(&docs).await.unwrap();
        assert_eq!(report.reembedded(), 1);
        assert_eq!(report.generation, 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_source_is_removed() {
        let (index, _, store) = index().await;
        index
            .reconcile(&[Document::new("a.md", "alpha"), Document::new("b.md", "beta")])
            .await
            .unwrap();
        let report = index.reconcile(&[Document::new("a.md", "alpha")]).await.unwrap();
        assert_eq!(report.outcome("b.md"), Some(&DocumentOutcome::Removed));
        assert_eq!(report.generation, 2);
        assert!(store.source_metadata("b.md").is_empty());
        assert!(index.reader().snapshot().source("b.md").is_none());
        assert!(!index.state().await.sources.contains_key("b.md"));
    }

    #[tokio::test]
    async fn test_duplicate_source_keeps_first() {
        let (index, _, _) = index().await;
        let report = index
            .reconcile(&[Document::new("a.md", "first"), Document::new("a.md", "second")])
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 1);
        let corpus = index.reader().snapshot();
        assert_eq!(corpus.source("a.md").unwrap()[0].text, "first");
    }

    #[tokio::test]
    async fn test_vectors_disabled_indexes_text_only() {
        let provider = Arc::new(VowelEmbedder {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryVectorStore::new());
        let index = LoreIndex::open(
            IndexConfig {
                vector_enabled: false,
                ..config()
            },
            provider.clone(),
            store.clone(),
            Arc::new(MemoryStateStore::new()),
        )
        .await
        .unwrap();
        let docs = vec![Document::new("a.md", "alpha")];
        let report = index.reconcile(&docs).await.unwrap();
        assert_eq!(
            report.outcome("a.md"),
            Some(&DocumentOutcome::Reembedded {
                chunks: 1,
                embedded: 0,
                text_only: 1
            })
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
        assert_eq!(index.reconcile(&docs).await.unwrap().unchanged(), 1);
    }

    #[tokio::test]
    async fn test_empty_document_is_indexed_with_no_chunks() {
        let (index, _, _) = index().await;
        let report = index.reconcile(&[Document::new("empty.md", "  ")]).await.unwrap();
        assert_eq!(
            report.outcome("empty.md"),
            Some(&DocumentOutcome::Reembedded {
                chunks: 0,
                embedded: 0,
                text_only: 0
            })
        );
        assert!(index.reader().snapshot().is_empty());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = SourceOutcome {
            source_id: "a.md".into(),
            outcome: DocumentOutcome::Failed {
                reason: "down".into(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["source_id"], "a.md");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "down");
    }
}
