//! Lore directory scanner.
//!
//! Walks `[lore].root`, applies include/exclude globs and returns one
//! [`Document`] per matching file, keyed by its `/`-separated path
//! relative to the root.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use lore_core::models::Document;

use crate::config::Config;

pub fn scan_lore(config: &Config) -> Result<Vec<Document>> {
    let lore = &config.lore;
    let root = &lore.root;
    if !root.is_dir() {
        bail!("Lore directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&lore.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(lore.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    let walker = WalkDir::new(root).follow_links(lore.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let source_id = relative_source_id(relative);

        if exclude_set.is_match(&source_id) || !include_set.is_match(&source_id) {
            continue;
        }

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read lore file: {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        debug!(source_id = %source_id, bytes = bytes.len(), "scanned");
        documents.push(Document::new(source_id, content));
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    Ok(documents)
}

/// Read the current text of one source from disk.
///
/// Rejects ids that would escape the lore root.
pub fn read_source(config: &Config, source_id: &str) -> Result<String> {
    let relative = PathBuf::from(source_id);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        bail!("Invalid source id: {}", source_id);
    }
    let path = config.lore.root.join(relative);
    let bytes = std::fs::read(&path)
        .with_context(|| format!("Failed to read lore file: {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn relative_source_id(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}
