//! The published chunk set.
//!
//! [`LoreIndex`](crate::index::LoreIndex) publishes a new [`Corpus`] value
//! after each document is durably written; readers take an `Arc` snapshot
//! and keep using it for the whole query. Swaps happen per document, so a
//! reader sees a document's old chunk set or its new one, never a partial
//! mix.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::embedding::embedding_version;
use crate::models::{topic_of, Chunk};
use crate::state::{IndexState, SourceState};
use crate::store::VectorHit;

/// Sources are shared between successive corpora, so publishing one
/// document copies the source map but no chunk text.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    generation: u64,
    sources: BTreeMap<String, Arc<SourceState>>,
}

impl Corpus {
    /// Generation of the last completed pass.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.sources.values().all(|s| s.chunks.is_empty())
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.sources.values().map(|s| s.chunks.len()).sum()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn embedded_count(&self) -> usize {
        self.chunks().filter(|c| c.is_embedded()).count()
    }

    /// All chunks, ordered by `(source_id, ordinal)`.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.sources.values().flat_map(|s| s.chunks.iter())
    }

    pub fn chunk(&self, source_id: &str, ordinal: u32) -> Option<&Chunk> {
        self.sources
            .get(source_id)?
            .chunks
            .get(ordinal as usize)
            .filter(|c| c.ordinal == ordinal)
    }

    pub fn source(&self, source_id: &str) -> Option<&[Chunk]> {
        self.sources.get(source_id).map(|s| s.chunks.as_slice())
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Sorted, de-duplicated topic names (lowercase file stems).
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.sources.keys().map(|s| topic_of(s)).collect();
        topics.sort();
        topics.dedup();
        topics
    }

    /// Chunks of the first source (by `source_id`) whose topic matches,
    /// case-insensitively.
    pub fn topic(&self, name: &str) -> Option<(&str, &[Chunk])> {
        let wanted = name.trim().to_lowercase();
        self.sources
            .iter()
            .find(|(source_id, _)| topic_of(source_id) == wanted)
            .map(|(source_id, s)| (source_id.as_str(), s.chunks.as_slice()))
    }

    /// The published chunk a vector hit stands for.
    ///
    /// `None` unless the chunk carries exactly the hit's embedding version
    /// and that version was produced by `identity` for the published text.
    /// A vector written for content that is not published yet, or by
    /// another model, never resolves.
    pub fn resolve(&self, hit: &VectorHit, identity: &str) -> Option<&Chunk> {
        let source = self.sources.get(&hit.metadata.source_id)?;
        let chunk = source.chunks.get(hit.metadata.ordinal as usize)?;
        let version = chunk.embedding_version.as_deref()?;
        let servable = chunk.chunk_id == hit.chunk_id
            && version == hit.metadata.embedding_version
            && version == embedding_version(identity, &source.content_hash);
        servable.then_some(chunk)
    }

    /// Whether any published chunk has a vector produced by `identity`.
    pub fn has_vectors_for(&self, identity: &str) -> bool {
        self.sources.values().any(|source| {
            let current = embedding_version(identity, &source.content_hash);
            source
                .chunks
                .iter()
                .any(|c| c.embedding_version.as_deref() == Some(current.as_str()))
        })
    }

    /// Corpus holding every source recorded in `state`.
    pub(crate) fn from_state(state: &IndexState) -> Self {
        Corpus {
            generation: state.generation,
            sources: state
                .sources
                .iter()
                .map(|(id, source)| (id.clone(), Arc::new(source.clone())))
                .collect(),
        }
    }

    pub(crate) fn with_generation(&self, generation: u64) -> Self {
        Self {
            generation,
            ..self.clone()
        }
    }

    /// Copy with one source replaced (`Some`) or removed (`None`).
    pub(crate) fn with_source(&self, source_id: &str, source: Option<SourceState>) -> Self {
        let mut next = self.clone();
        match source {
            Some(source) => {
                next.sources.insert(source_id.to_string(), Arc::new(source));
            }
            None => {
                next.sources.remove(source_id);
            }
        }
        next
    }
}

/// Read-only handle to the latest published [`Corpus`].
#[derive(Clone)]
pub struct CorpusReader {
    current: Arc<RwLock<Arc<Corpus>>>,
}

impl CorpusReader {
    /// The current corpus. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<Corpus> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

/// Write side, held by the index only.
pub(crate) struct CorpusWriter {
    current: Arc<RwLock<Arc<Corpus>>>,
}

impl CorpusWriter {
    pub(crate) fn new(corpus: Corpus) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(corpus))),
        }
    }

    pub(crate) fn reader(&self) -> CorpusReader {
        CorpusReader {
            current: Arc::clone(&self.current),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Corpus> {
        self.reader().snapshot()
    }

    /// Replace the published corpus with `f(current)`.
    pub(crate) fn publish(&self, f: impl FnOnce(&Corpus) -> Corpus) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = f(&guard);
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(source: &str, texts: &[&str]) -> Option<SourceState> {
        Some(SourceState {
            content_hash: crate::models::content_hash(&texts.concat()),
            chunks: texts
                .iter()
                .enumerate()
                .map(|(i, t)| Chunk::new(source, i as u32, *t))
                .collect(),
        })
    }

    /// One embedded chunk per source, stamped for `identity`.
    fn embedded(source: &str, text: &str, identity: &str) -> (SourceState, VectorHit) {
        let hash = crate::models::content_hash(text);
        let version = embedding_version(identity, &hash);
        let mut chunk = Chunk::new(source, 0, text);
        chunk.embedding_version = Some(version.clone());
        let hit = VectorHit {
            chunk_id: chunk.chunk_id.clone(),
            metadata: crate::store::VectorMetadata {
                source_id: source.to_string(),
                ordinal: 0,
                embedding_version: version,
            },
            score: 0.9,
        };
        (
            SourceState {
                content_hash: hash,
                chunks: vec![chunk],
            },
            hit,
        )
    }

    #[test]
    fn test_with_source_replaces_whole_set() {
        let c = Corpus::default()
            .with_source("a.md", chunks("a.md", &["one", "two", "three"]))
            .with_source("b.md", chunks("b.md", &["bee"]));
        assert_eq!(c.len(), 4);

        let c = c.with_source("a.md", chunks("a.md", &["uno"]));
        assert_eq!(c.len(), 2);
        assert_eq!(c.source("a.md").unwrap()[0].text, "uno");
        assert!(c.chunk("a.md", 2).is_none());
        assert_eq!(c.chunk("b.md", 0).unwrap().text, "bee");

        let c = c.with_source("a.md", None);
        assert_eq!(c.source_count(), 1);
        assert_eq!(c.chunks().count(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_publish() {
        let writer = CorpusWriter::new(Corpus::default());
        let reader = writer.reader();
        let before = reader.snapshot();
        writer.publish(|c| c.with_source("a.md", chunks("a.md", &["x"])));
        assert!(before.is_empty());
        assert_eq!(reader.snapshot().len(), 1);
    }

    #[test]
    fn test_topics_and_lookup() {
        let c = Corpus::default()
            .with_source("regions/Dragons.md", chunks("regions/Dragons.md", &["d"]))
            .with_source("court.txt", chunks("court.txt", &["k"]));
        assert_eq!(c.topics(), vec!["court".to_string(), "dragons".to_string()]);
        let (source, found) = c.topic("DRAGONS").unwrap();
        assert_eq!(source, "regions/Dragons.md");
        assert_eq!(found[0].text, "d");
        assert!(c.topic("elves").is_none());
    }

    #[test]
    fn test_resolve_requires_matching_version() {
        let (source, hit) = embedded("dragons.md", "A dragon guards the keep.", "bag/8");
        let c = Corpus::default().with_source("dragons.md", Some(source));
        assert!(c.has_vectors_for("bag/8"));
        assert_eq!(c.resolve(&hit, "bag/8").unwrap().text, "A dragon guards the keep.");

        // Vector already rewritten for content that is not published yet.
        let (_, newer) = embedded("dragons.md", "The wyrm rules.", "bag/8");
        assert!(c.resolve(&newer, "bag/8").is_none());

        // Vectors from another model are not servable.
        assert!(c.resolve(&hit, "bag/16").is_none());
        assert!(!c.has_vectors_for("bag/16"));
    }

    #[test]
    fn test_text_only_corpus_has_no_vectors() {
        let c = Corpus::default().with_source("a.md", chunks("a.md", &["one"]));
        assert!(!c.has_vectors_for("bag/8"));
    }
}
