//! `lore sync` and `lore rebuild`.
//!
//! Scans the lore directory, runs one reconcile (or rebuild) pass over the
//! result and prints a per-pass summary. A document that fails to index is
//! reported but does not fail the command.

use anyhow::Result;
use lore_core::index::{DocumentOutcome, ReconcileReport};

use crate::config::Config;
use crate::connector_fs;
use crate::harness::Harness;
use crate::sqlite_store;

pub async fn run_sync(config: &Config) -> Result<()> {
    run_pass(config, false).await
}

pub async fn run_rebuild(config: &Config) -> Result<()> {
    run_pass(config, true).await
}

async fn run_pass(config: &Config, force: bool) -> Result<()> {
    let documents = connector_fs::scan_lore(config)?;
    let harness = Harness::open(config).await?;

    let report = if force {
        harness.index.rebuild(&documents).await?
    } else {
        harness.index.reconcile(&documents).await?
    };
    sqlite_store::record_last_sync(&harness.pool, report.finished_at.timestamp()).await?;

    print_report(
        if force { "rebuild lore" } else { "sync lore" },
        documents.len(),
        &report,
        harness.provider.is_enabled() && config.retrieval.vector_enabled,
    );

    harness.close().await;
    Ok(())
}

fn print_report(title: &str, scanned: usize, report: &ReconcileReport, vectors: bool) {
    println!("{}", title);
    println!("  scanned: {} files", scanned);
    println!("  unchanged: {}", report.unchanged());
    println!("  reembedded: {}", report.reembedded());
    println!("  failed: {}", report.failed());
    for outcome in &report.outcomes {
        if let DocumentOutcome::Failed { reason } = &outcome.outcome {
            println!("    {}: {}", outcome.source_id, reason);
        }
    }
    println!("  removed: {}", report.removed());
    if vectors {
        println!("  text-only chunks: {}", report.text_only_chunks());
    }
    println!("  generation: {}", report.generation);
    println!("ok");
}
