//! Index status overview.
//!
//! Summarizes what is published: sources, chunks, embedding coverage, the
//! current generation and when the last pass finished. Used by
//! `lore status` to confirm that syncs and embeddings are working.

use anyhow::Result;

use crate::config::Config;
use crate::harness::Harness;
use crate::sqlite_store;

pub async fn run_status(config: &Config) -> Result<()> {
    let harness = Harness::open(config).await?;
    let corpus = harness.index.reader().snapshot();

    let total_vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(&harness.pool)
        .await?;
    let last_sync = sqlite_store::read_last_sync(&harness.pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let total_chunks = corpus.len();
    let embedded = corpus.embedded_count();

    println!("Lore Harness: Index Status");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Lore root:   {}", config.lore.root.display());
    println!();
    println!("  Sources:     {}", corpus.source_count());
    println!("  Topics:      {}", corpus.topics().len());
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        embedded,
        total_chunks,
        if total_chunks > 0 {
            (embedded * 100) / total_chunks
        } else {
            0
        }
    );
    println!("  Vectors:     {}", total_vectors);
    println!();
    println!("  Provider:    {}", provider_label(&harness, config));
    println!(
        "  Retrieval:   {}",
        if config.retrieval.vector_enabled && harness.provider.is_enabled() {
            if corpus.has_vectors_for(&harness.provider.model_identity()) {
                "vector (lexical fallback)"
            } else if embedded > 0 {
                "lexical (model changed, run `lore sync`)"
            } else {
                "lexical (no vectors yet)"
            }
        } else {
            "lexical only"
        }
    );
    println!("  Generation:  {}", corpus.generation());
    println!(
        "  Last sync:   {}",
        match last_sync {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );
    println!();

    harness.close().await;
    Ok(())
}

fn provider_label(harness: &Harness, config: &Config) -> String {
    if harness.provider.is_enabled() {
        format!("{} ({})", config.embedding.provider, harness.provider.model_identity())
    } else if config.embedding.is_enabled() {
        format!("{} (unavailable)", config.embedding.provider)
    } else {
        "disabled".to_string()
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
