//! # Lore Core
//!
//! Runtime-agnostic logic for Lore Harness: the data model, the chunker,
//! the [`EmbeddingProvider`](embedding::EmbeddingProvider) and
//! [`VectorStore`](store::VectorStore) seams, the lexical fallback scorer,
//! the incremental [`LoreIndex`](index::LoreIndex) and the
//! [`RetrievalEngine`](retrieval::RetrievalEngine).
//!
//! This crate performs no SQL, HTTP or filesystem I/O. Concrete providers
//! and persistent stores live in the `lore-harness` application crate.
//!
//! ```text
//! Document ──▶ chunk::split ──▶ EmbeddingProvider ──▶ VectorStore
//!                   │                                     ▲
//!                   ▼                                     │ search
//!              LoreIndex ── publishes ──▶ Corpus ◀── RetrievalEngine
//!                                           │             │
//!                                           └─ lexical ◀──┘ (fallback)
//! ```

pub mod chunk;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod lexical;
pub mod models;
pub mod retrieval;
pub mod retry;
pub mod state;
pub mod store;
