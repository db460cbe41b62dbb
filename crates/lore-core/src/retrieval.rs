//! Query side of the engine.
//!
//! [`RetrievalEngine::query`] tries the vector path first and falls back
//! to [`lexical`](crate::lexical) scoring over the published corpus when
//! the vector path is disabled, fails, times out, or the index holds no
//! embedded chunk. It never returns an error: retrieval is advisory, so
//! total failure is an empty result.
//!
//! Each query reads one corpus snapshot, so its hits all come from the
//! same published state even while a reconcile pass is running.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::corpus::{Corpus, CorpusReader};
use crate::embedding::EmbeddingProvider;
use crate::error::{ProviderError, StoreError};
use crate::lexical;
use crate::models::{rank_and_truncate, topic_of, Chunk, ScoredChunk};
use crate::retry::RetryPolicy;
use crate::store::VectorStore;

/// Printed by [`render_context`] when there is nothing to show.
pub const NO_LORE_FOUND: &str = "No specific lore found for this query.";

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// When false every query is answered lexically.
    pub vector_enabled: bool,
    pub default_k: usize,
    /// Vector hits below this cosine similarity are dropped.
    pub min_score: f64,
    /// Neighbors requested from the store per wanted hit.
    pub candidate_multiplier: usize,
    /// Budget for query embedding plus vector search.
    pub query_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_enabled: true,
            default_k: 5,
            min_score: 0.2,
            candidate_multiplier: 2,
            query_timeout: Duration::from_millis(2000),
            retry: RetryPolicy {
                max_retries: 2,
                backoff: Duration::from_millis(50),
            },
        }
    }
}

/// Which path produced a [`QueryResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalPath {
    Vector,
    Lexical,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// At most `k` hits, score descending, ties by `(source_id, ordinal)`.
    pub hits: Vec<ScoredChunk>,
    /// Generation of the corpus snapshot the hits came from.
    pub generation: u64,
    pub path: RetrievalPath,
}

/// Why the vector path was not used for a query.
#[derive(Debug, thiserror::Error)]
enum VectorPathError {
    #[error("vector path disabled")]
    Disabled,
    #[error("index has no vectors for the current model")]
    Degraded,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("vector query timed out after {0:?}")]
    Timeout(Duration),
}

/// A source matched by [`RetrievalEngine::topic`].
#[derive(Debug, Clone)]
pub struct TopicEntry {
    pub source_id: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Clone)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    corpus: CorpusReader,
}

impl RetrievalEngine {
    pub fn new(
        config: RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        corpus: CorpusReader,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            corpus,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    fn vector_capable(&self) -> bool {
        self.config.vector_enabled && self.provider.is_enabled()
    }

    /// [`query`](Self::query) with the configured `default_k`.
    pub async fn query_default(&self, text: &str) -> QueryResult {
        self.query(text, self.config.default_k).await
    }

    /// Top-`k` chunks for `text`.
    pub async fn query(&self, text: &str, k: usize) -> QueryResult {
        let corpus = self.corpus.snapshot();
        let generation = corpus.generation();

        if k == 0 || corpus.is_empty() {
            let path = if self.vector_capable() {
                RetrievalPath::Vector
            } else {
                RetrievalPath::Lexical
            };
            return QueryResult {
                hits: Vec::new(),
                generation,
                path,
            };
        }

        match self.vector_search(text, k, &corpus).await {
            Ok(hits) => {
                debug!(hits = hits.len(), generation, "vector query");
                QueryResult {
                    hits,
                    generation,
                    path: RetrievalPath::Vector,
                }
            }
            Err(e) => {
                match e {
                    VectorPathError::Disabled => {}
                    VectorPathError::Degraded => {
                        debug!("no vectors for the current model, using lexical fallback")
                    }
                    _ => warn!(error = %e, "vector path failed, using lexical fallback"),
                }
                let hits = lexical::search(text, corpus.chunks(), k);
                debug!(hits = hits.len(), generation, "lexical query");
                QueryResult {
                    hits,
                    generation,
                    path: RetrievalPath::Lexical,
                }
            }
        }
    }

    async fn vector_search(
        &self,
        text: &str,
        k: usize,
        corpus: &Corpus,
    ) -> Result<Vec<ScoredChunk>, VectorPathError> {
        if !self.vector_capable() {
            return Err(VectorPathError::Disabled);
        }
        let identity = self.provider.model_identity();
        if !corpus.has_vectors_for(&identity) {
            return Err(VectorPathError::Degraded);
        }

        let candidates = k.saturating_mul(self.config.candidate_multiplier.max(1));
        let retry = &self.config.retry;
        let search = async {
            let vector = retry
                .run("embed query", || self.provider.embed(text))
                .await?;
            let hits = retry
                .run("vector search", || self.store.search(&vector, candidates))
                .await?;
            Ok::<_, VectorPathError>(hits)
        };
        let hits = tokio::time::timeout(self.config.query_timeout, search)
            .await
            .map_err(|_| VectorPathError::Timeout(self.config.query_timeout))??;

        // A hit is servable only if the snapshot holds the exact chunk
        // version the vector was computed from.
        let mut scored: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.config.min_score)
            .filter_map(|hit| {
                corpus.resolve(&hit, &identity).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    score: hit.score,
                })
            })
            .collect();
        rank_and_truncate(&mut scored, k);
        Ok(scored)
    }

    /// Sorted topic names of the published corpus.
    pub fn topics(&self) -> Vec<String> {
        self.corpus.snapshot().topics()
    }

    /// The indexed source whose topic matches `name`, case-insensitively.
    pub fn topic(&self, name: &str) -> Option<TopicEntry> {
        let corpus = self.corpus.snapshot();
        corpus.topic(name).map(|(source_id, chunks)| TopicEntry {
            source_id: source_id.to_string(),
            chunks: chunks.to_vec(),
        })
    }
}

/// Format hits as prompt context.
///
/// Each hit becomes a `--- TOPIC ---` header followed by its text. Blocks
/// are added in rank order while they fit in `max_chars`; the first block
/// is truncated to fit rather than dropped. No hits yields
/// [`NO_LORE_FOUND`].
pub fn render_context(hits: &[ScoredChunk], max_chars: usize) -> String {
    let mut out = String::new();
    for hit in hits {
        let block = format!(
            "--- {} ---\n{}\n",
            topic_of(&hit.chunk.source_id).to_uppercase(),
            hit.chunk.text.trim()
        );
        let sep = if out.is_empty() { "" } else { "\n" };
        if out.len() + sep.len() + block.len() <= max_chars {
            out.push_str(sep);
            out.push_str(&block);
        } else if out.is_empty() {
            let mut end = max_chars.min(block.len());
            while !block.is_char_boundary(end) {
                end -= 1;
            }
            out.push_str(&block[..end]);
            break;
        } else {
            break;
        }
    }
    if out.trim().is_empty() {
        NO_LORE_FOUND.to_string()
    } else {
        out
    }
}
