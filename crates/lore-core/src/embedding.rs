//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the [`embedding_version`] stamp used for staleness detection,
//! plus pure helpers for vector serialization and similarity.
//!
//! Concrete provider implementations (OpenAI, Ollama, fastembed) live in
//! the `lore-harness` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::ProviderError;

/// Maps text to a fixed-length vector.
///
/// One call embeds one text. Implementations report outages as
/// [`ProviderError::Unavailable`] and retryable hiccups as
/// [`ProviderError::Transient`]; retry policy is the caller's concern.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Whether this provider can produce vectors at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Identity that changes whenever vectors stop being comparable.
    fn model_identity(&self) -> String {
        format!("{}/{}", self.model_name(), self.dims())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Provider used when embeddings are not configured. Always unavailable.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Unavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

/// Version stamp for a chunk's vector: SHA-256 over model identity and
/// document content hash.
///
/// A model upgrade changes the stamp for every chunk without touching
/// document content, so it flows through the same staleness check as an
/// edit.
pub fn embedding_version(model_identity: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_identity.as_bytes());
    hasher.update([0u8]);
    hasher.update(content_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use lore_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_or_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_embedding_version_tracks_model_and_content() {
        let v = embedding_version("minilm/384", "abc");
        assert_eq!(v, embedding_version("minilm/384", "abc"));
        assert_ne!(v, embedding_version("minilm/768", "abc"));
        assert_ne!(v, embedding_version("minilm/384", "abd"));
    }

    #[tokio::test]
    async fn test_disabled_provider_is_unavailable() {
        let p = DisabledProvider;
        assert!(!p.is_enabled());
        assert!(matches!(
            p.embed("dragon").await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
