//! # Lore Harness
//!
//! The `lore` application: SQLite persistence, HTTP and local embedding
//! providers, the lore directory scanner and the CLI commands, all built
//! on the engine in [`lore_core`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────┐
//! │ connector_fs │──▶│ lore_core        │──▶│  SQLite    │
//! │ lore dir     │   │ LoreIndex        │   │ state+vecs │
//! └──────────────┘   │ RetrievalEngine  │   └────────────┘
//!                    └────────┬─────────┘
//!                             ▼
//!                      ┌──────────────┐
//!                      │  CLI (lore)  │
//!                      └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`connector_fs`] | Lore directory scanner |
//! | [`embedding`] | OpenAI, Ollama and local embedding providers |
//! | [`sqlite_store`] | SQLite vector and state stores |
//! | [`harness`] | Opens the index and engine for a command |
//! | [`ingest`] | `sync` and `rebuild` |
//! | [`search`] | `search` and `context` |
//! | [`get`] | `topics` and `get` |
//! | [`stats`] | `status` |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod get;
pub mod harness;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
