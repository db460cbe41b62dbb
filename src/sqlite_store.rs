//! SQLite-backed [`VectorStore`] and [`StateStore`].
//!
//! Vectors are stored as little-endian f32 BLOBs in `chunk_vectors` and
//! searched by brute-force cosine similarity in Rust, which is plenty for
//! a lore directory of a few thousand chunks. Index bookkeeping lives in
//! `sources`, `chunks` and `index_meta`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use lore_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use lore_core::error::StoreError;
use lore_core::models::Chunk;
use lore_core::state::{IndexState, SourceState, StateStore};
use lore_core::store::{VectorHit, VectorMetadata, VectorStore};

const GENERATION_KEY: &str = "generation";
const LAST_SYNC_KEY: &str = "last_sync";

/// Pool exhaustion and I/O errors mean the database is not reachable;
/// anything else is treated as a retryable backend error.
fn store_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, source_id, ordinal, embedding_version, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                source_id = excluded.source_id,
                ordinal = excluded.ordinal,
                embedding_version = excluded.embedding_version,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(chunk_id)
        .bind(&metadata.source_id)
        .bind(metadata.ordinal as i64)
        .bind(&metadata.embedding_version)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chunk_vectors WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<(), StoreError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for id in chunk_ids {
            sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, StoreError> {
        // Fetch all vectors and compute cosine similarity in Rust
        let rows = sqlx::query(
            "SELECT chunk_id, source_id, ordinal, embedding_version, embedding FROM chunk_vectors",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk_id: String = row.try_get("chunk_id").map_err(store_error)?;
            let blob: Vec<u8> = row.try_get("embedding").map_err(store_error)?;
            let ordinal: i64 = row.try_get("ordinal").map_err(store_error)?;
            let metadata = VectorMetadata {
                source_id: row.try_get("source_id").map_err(store_error)?,
                ordinal: u32::try_from(ordinal).map_err(|_| {
                    StoreError::Backend(format!("Invalid ordinal {} for {}", ordinal, chunk_id))
                })?,
                embedding_version: row.try_get("embedding_version").map_err(store_error)?,
            };
            hits.push(VectorHit {
                chunk_id,
                metadata,
                score: cosine_similarity(vector, &blob_to_vec(&blob)) as f64,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Read the pass generation, 0 when no pass has completed.
pub async fn read_generation(pool: &SqlitePool) -> Result<u64> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(GENERATION_KEY)
        .fetch_optional(pool)
        .await?;
    match value {
        Some(v) => v
            .parse::<u64>()
            .with_context(|| format!("Corrupt generation in index_meta: '{}'", v)),
        None => Ok(0),
    }
}

/// Unix timestamp of the last completed sync or rebuild.
pub async fn read_last_sync(pool: &SqlitePool) -> Result<Option<i64>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(LAST_SYNC_KEY)
        .fetch_optional(pool)
        .await?;
    Ok(value.and_then(|v| v.parse().ok()))
}

pub async fn record_last_sync(pool: &SqlitePool, ts: i64) -> Result<()> {
    write_meta(pool, LAST_SYNC_KEY, &ts.to_string()).await
}

async fn write_meta(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO index_meta (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self) -> Result<IndexState> {
        let mut state = IndexState {
            generation: read_generation(&self.pool).await?,
            ..IndexState::default()
        };

        let sources = sqlx::query("SELECT source_id, content_hash FROM sources")
            .fetch_all(&self.pool)
            .await?;
        for row in &sources {
            state.sources.insert(
                row.try_get("source_id")?,
                SourceState {
                    content_hash: row.try_get("content_hash")?,
                    chunks: Vec::new(),
                },
            );
        }

        let chunks = sqlx::query(
            "SELECT chunk_id, source_id, ordinal, text, embedding_version FROM chunks ORDER BY source_id, ordinal",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &chunks {
            let source_id: String = row.try_get("source_id")?;
            let ordinal: i64 = row.try_get("ordinal")?;
            let chunk = Chunk {
                chunk_id: row.try_get("chunk_id")?,
                source_id: source_id.clone(),
                ordinal: u32::try_from(ordinal)
                    .with_context(|| format!("Invalid ordinal {} for {}", ordinal, source_id))?,
                text: row.try_get("text")?,
                embedding_version: row.try_get("embedding_version")?,
            };
            if let Some(source) = state.sources.get_mut(&source_id) {
                source.chunks.push(chunk);
            }
        }

        Ok(state)
    }

    async fn put_source(&self, source_id: &str, source: &SourceState) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sources (source_id, content_hash, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source_id)
        .bind(&source.content_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        for chunk in &source.chunks {
            sqlx::query(
                "INSERT INTO chunks (chunk_id, source_id, ordinal, text, embedding_version) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.chunk_id)
            .bind(source_id)
            .bind(chunk.ordinal as i64)
            .bind(&chunk.text)
            .bind(&chunk.embedding_version)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_source(&self, source_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sources WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_generation(&self, generation: u64) -> Result<()> {
        write_meta(&self.pool, GENERATION_KEY, &generation.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        // Single connection: each new in-memory connection is a fresh database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        pool
    }

    fn meta(source: &str, ordinal: u32) -> VectorMetadata {
        VectorMetadata {
            source_id: source.to_string(),
            ordinal,
            embedding_version: "v1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_vector_store_search_and_delete() {
        let store = SqliteVectorStore::new(pool().await);
        store.upsert("a0", &[1.0, 0.0], &meta("a.md", 0)).await.unwrap();
        store.upsert("a1", &[0.6, 0.8], &meta("a.md", 1)).await.unwrap();
        store.upsert("b0", &[0.0, 1.0], &meta("b.md", 0)).await.unwrap();

        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "a0");
        assert_eq!(hits[1].chunk_id, "a1");
        assert_eq!(hits[1].metadata, meta("a.md", 1));

        store.delete_chunks(&["a1".to_string()]).await.unwrap();
        store.delete_by_source("b.md").await.unwrap();
        let hits = store.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "a0");
    }

    #[tokio::test]
    async fn test_upsert_replaces_vector() {
        let store = SqliteVectorStore::new(pool().await);
        store.upsert("a0", &[1.0, 0.0], &meta("a.md", 0)).await.unwrap();
        store.upsert("a0", &[0.0, 1.0], &meta("a.md", 0)).await.unwrap();
        let hits = store.search(&[0.0, 1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_state_store_round_trip() {
        let store = SqliteStateStore::new(pool().await);
        assert_eq!(store.load().await.unwrap(), IndexState::default());

        let mut embedded = Chunk::new("lore/dragons.md", 0, "A dragon guards the keep.");
        embedded.embedding_version = Some("v1".to_string());
        let text_only = Chunk::new("lore/dragons.md", 1, "It sleeps by day.");
        let source = SourceState {
            content_hash: "h1".to_string(),
            chunks: vec![embedded, text_only],
        };
        store.put_source("lore/dragons.md", &source).await.unwrap();
        store.set_generation(3).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.generation, 3);
        assert_eq!(loaded.sources["lore/dragons.md"], source);

        // Replacing a source replaces its whole chunk set
        let shorter = SourceState {
            content_hash: "h2".to_string(),
            chunks: vec![Chunk::new("lore/dragons.md", 0, "Gone.")],
        };
        store.put_source("lore/dragons.md", &shorter).await.unwrap();
        assert_eq!(store.load().await.unwrap().sources["lore/dragons.md"], shorter);

        store.remove_source("lore/dragons.md").await.unwrap();
        assert!(store.load().await.unwrap().sources.is_empty());
    }

    #[tokio::test]
    async fn test_last_sync_meta() {
        let pool = pool().await;
        assert_eq!(read_last_sync(&pool).await.unwrap(), None);
        record_last_sync(&pool, 1_700_000_000).await.unwrap();
        assert_eq!(read_last_sync(&pool).await.unwrap(), Some(1_700_000_000));
        assert_eq!(read_generation(&pool).await.unwrap(), 0);
    }
}
