//! Wiring of config, SQLite stores, provider, index and engine.
//!
//! Every CLI command that touches the index opens a [`Harness`]. The
//! schema is applied on open so commands work against a fresh database.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

use lore_core::embedding::{DisabledProvider, EmbeddingProvider};
use lore_core::index::LoreIndex;
use lore_core::retrieval::RetrievalEngine;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::migrate;
use crate::sqlite_store::{SqliteStateStore, SqliteVectorStore};

pub struct Harness {
    pub pool: SqlitePool,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub index: LoreIndex,
    pub engine: RetrievalEngine,
}

impl Harness {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        // A provider that cannot be built leaves the index lexical-only.
        let provider: Arc<dyn EmbeddingProvider> = match create_provider(&config.embedding) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(
                    provider = %config.embedding.provider,
                    error = %e,
                    "embedding provider unavailable, using lexical retrieval only"
                );
                Arc::new(DisabledProvider)
            }
        };

        let store = Arc::new(SqliteVectorStore::new(pool.clone()));
        let state_store = Arc::new(SqliteStateStore::new(pool.clone()));
        let index = LoreIndex::open(
            config.index_config(),
            provider.clone(),
            store.clone(),
            state_store,
        )
        .await?;
        let engine = RetrievalEngine::new(
            config.retrieval_config(),
            provider.clone(),
            store,
            index.reader(),
        );

        Ok(Self {
            pool,
            provider,
            index,
            engine,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
