//! `lore search` and `lore context`.

use anyhow::Result;

use lore_core::models::topic_of;
use lore_core::retrieval::{render_context, RetrievalPath};

use crate::config::Config;
use crate::harness::Harness;

const EXCERPT_CHARS: usize = 160;

pub async fn run_search(config: &Config, query: &str, k: Option<usize>, json: bool) -> Result<()> {
    let harness = Harness::open(config).await?;
    let k = k.unwrap_or(config.retrieval.default_k);
    let result = harness.engine.query(query, k).await;
    harness.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in result.hits.iter().enumerate() {
        let chunk = &hit.chunk;
        println!(
            "{}. [{:.2}] {} / {}#{}",
            i + 1,
            hit.score,
            topic_of(&chunk.source_id),
            chunk.source_id,
            chunk.ordinal
        );
        println!("    excerpt: \"{}\"", excerpt(&chunk.text));
        println!();
    }
    println!(
        "path: {}, generation: {}",
        match result.path {
            RetrievalPath::Vector => "vector",
            RetrievalPath::Lexical => "lexical",
        },
        result.generation
    );
    Ok(())
}

/// Print the top hits as a prompt-ready context block.
pub async fn run_context(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let harness = Harness::open(config).await?;
    let k = k.unwrap_or(config.retrieval.default_k);
    let result = harness.engine.query(query, k).await;
    harness.close().await;

    println!(
        "{}",
        render_context(&result.hits, config.retrieval.max_context_chars)
    );
    Ok(())
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
