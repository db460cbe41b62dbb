//! Core data models used throughout Lore Harness.
//!
//! These types represent the documents and chunks that flow through the
//! ingestion and retrieval pipeline.

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for deterministic chunk IDs (UUIDv5 over `"{source_id}#{ordinal}"`).
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_7265_2d68_6172_6e65_7373_2d63_6b31);

/// One source file of lore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identifier, the path relative to the lore root.
    pub source_id: String,
    /// Raw text.
    pub content: String,
    /// SHA-256 hex digest of `content`.
    pub content_hash: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            source_id: source_id.into(),
            content_hash: content_hash(&content),
            content,
        }
    }

    /// Lowercase file stem of the source, e.g. `"regions/Dragons.md"` → `"dragons"`.
    pub fn topic(&self) -> String {
        topic_of(&self.source_id)
    }
}

/// A contiguous slice of a [`Document`]'s text.
///
/// `embedding_version` is `None` while the chunk has no vector in the
/// store (not yet embedded, or embedding failed). Such chunks are served
/// by the lexical fallback only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_id: String,
    pub ordinal: u32,
    pub text: String,
    pub embedding_version: Option<String>,
}

impl Chunk {
    pub fn new(source_id: &str, ordinal: u32, text: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id(source_id, ordinal),
            source_id: source_id.to_string(),
            ordinal,
            text: text.into(),
            embedding_version: None,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding_version.is_some()
    }
}

/// A retrieved chunk with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

impl ScoredChunk {
    /// Result ordering: score descending, then `(source_id, ordinal)` ascending.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.chunk.source_id.cmp(&other.chunk.source_id))
            .then_with(|| self.chunk.ordinal.cmp(&other.chunk.ordinal))
    }
}

/// Sort hits into result order and keep the first `k`.
pub fn rank_and_truncate(hits: &mut Vec<ScoredChunk>, k: usize) {
    hits.sort_by(ScoredChunk::rank_cmp);
    hits.truncate(k);
}

/// Deterministic chunk ID for a source and ordinal.
pub fn chunk_id(source_id: &str, ordinal: u32) -> String {
    Uuid::new_v5(
        &CHUNK_NAMESPACE,
        format!("{}#{}", source_id, ordinal).as_bytes(),
    )
    .to_string()
}

/// SHA-256 hex digest of a document's content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Topic name of a source ID: the lowercase file stem.
pub fn topic_of(source_id: &str) -> String {
    Path::new(source_id)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| source_id.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: &str, ordinal: u32, score: f64) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(source, ordinal, "text"),
            score,
        }
    }

    #[test]
    fn test_chunk_id_stable_and_distinct() {
        assert_eq!(chunk_id("a.md", 0), chunk_id("a.md", 0));
        assert_ne!(chunk_id("a.md", 0), chunk_id("a.md", 1));
        assert_ne!(chunk_id("a.md", 1), chunk_id("b.md", 1));
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = Document::new("a.md", "The keep stands.");
        let b = Document::new("a.md", "The keep has fallen.");
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash, Document::new("x", "The keep stands.").content_hash);
    }

    #[test]
    fn test_topic_is_lowercase_stem() {
        assert_eq!(topic_of("regions/Dragons.md"), "dragons");
        assert_eq!(topic_of("kings_court.txt"), "kings_court");
        assert_eq!(Document::new("Magic.md", "").topic(), "magic");
    }

    #[test]
    fn test_rank_ties_by_source_then_ordinal() {
        let mut hits = vec![
            hit("b.md", 0, 0.5),
            hit("a.md", 2, 0.5),
            hit("c.md", 0, 0.9),
            hit("a.md", 1, 0.5),
        ];
        rank_and_truncate(&mut hits, 3);
        let order: Vec<(&str, u32)> = hits
            .iter()
            .map(|h| (h.chunk.source_id.as_str(), h.chunk.ordinal))
            .collect();
        assert_eq!(order, vec![("c.md", 0), ("a.md", 1), ("a.md", 2)]);
    }
}
