//! `lore topics` and `lore get`.
//!
//! Topics are the lowercase file stems of indexed sources. `get` resolves a
//! topic through the published corpus and prints the source file as it is
//! on disk, since chunk texts overlap and cannot be joined back losslessly.

use anyhow::{bail, Result};

use lore_core::models::topic_of;

use crate::config::Config;
use crate::connector_fs;
use crate::harness::Harness;

pub async fn run_topics(config: &Config) -> Result<()> {
    let harness = Harness::open(config).await?;
    let topics = harness.engine.topics();
    harness.close().await;

    if topics.is_empty() {
        println!("No topics indexed. Run `lore sync` first.");
        return Ok(());
    }
    for topic in topics {
        println!("{}", topic);
    }
    Ok(())
}

pub async fn run_get(config: &Config, topic: &str) -> Result<()> {
    let harness = Harness::open(config).await?;
    let entry = harness.engine.topic(topic);
    harness.close().await;

    let entry = match entry {
        Some(entry) => entry,
        None => bail!("topic not found: {}", topic),
    };

    let text = connector_fs::read_source(config, &entry.source_id)?;
    println!("--- {} ({}) ---", topic_of(&entry.source_id), entry.source_id);
    println!("{}", text.trim_end());
    Ok(())
}
