//! Error channels for the engine seams.
//!
//! Providers and stores report failures through these typed enums so the
//! index and retrieval engine can tell a retryable hiccup from an outage.

use crate::retry::Retryable;

/// Failure of a single [`EmbeddingProvider`](crate::embedding::EmbeddingProvider) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Provider is down, disabled or misconfigured. Not retried.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Rate limit, server error or timeout. Retried with backoff.
    #[error("embedding request failed: {0}")]
    Transient(String),
}

/// Failure of a [`VectorStore`](crate::store::VectorStore) operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store is down or disabled. Not retried.
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    /// Any other backend error. Retried with backoff.
    #[error("vector store error: {0}")]
    Backend(String),
}

/// Failure of a whole [`LoreIndex`](crate::index::LoreIndex) pass.
///
/// Per-document problems never surface here; they are reported as
/// [`DocumentOutcome::Failed`](crate::index::DocumentOutcome::Failed).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("a reconcile pass is already running")]
    ReconcileInProgress,
    #[error("failed to persist index state")]
    State(#[source] anyhow::Error),
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}
