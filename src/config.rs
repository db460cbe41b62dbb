//! TOML configuration.
//!
//! Every section except `[db]` and `[lore]` is optional and falls back to
//! defaults. [`load_config`] validates the file and fails with a message
//! naming the offending key.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lore_core::chunk::ChunkerConfig;
use lore_core::index::IndexConfig;
use lore_core::retrieval::RetrievalConfig as EngineRetrievalConfig;
use lore_core::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub lore: LoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The lore directory scanned by `sync`.
#[derive(Debug, Deserialize, Clone)]
pub struct LoreConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    200
}
fn default_overlap() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    200
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_concurrency() -> usize {
    4
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_enabled")]
    pub vector_enabled: bool,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_enabled: default_vector_enabled(),
            default_k: default_k(),
            min_score: default_min_score(),
            candidate_multiplier: default_candidate_multiplier(),
            query_timeout_ms: default_query_timeout_ms(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_vector_enabled() -> bool {
    true
}
fn default_k() -> usize {
    5
}
fn default_min_score() -> f64 {
    0.2
}
fn default_candidate_multiplier() -> usize {
    2
}
fn default_query_timeout_ms() -> u64 {
    2000
}
fn default_max_context_chars() -> usize {
    6000
}

impl Config {
    /// Whether the vector path is in use at all.
    pub fn vectors_enabled(&self) -> bool {
        self.retrieval.vector_enabled && self.embedding.is_enabled()
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_tokens: self.chunking.max_tokens,
            overlap_tokens: self.chunking.overlap_tokens,
        }
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            chunker: self.chunker_config(),
            retry: self.embedding.retry_policy(),
            concurrency: self.embedding.concurrency,
            vector_enabled: self.retrieval.vector_enabled,
        }
    }

    pub fn retrieval_config(&self) -> EngineRetrievalConfig {
        EngineRetrievalConfig {
            vector_enabled: self.retrieval.vector_enabled,
            default_k: self.retrieval.default_k,
            min_score: self.retrieval.min_score,
            candidate_multiplier: self.retrieval.candidate_multiplier,
            query_timeout: Duration::from_millis(self.retrieval.query_timeout_ms),
            retry: self.embedding.retry_policy(),
        }
    }
}

/// Upper bound for `chunking.max_tokens`.
pub const MAX_CHUNK_TOKENS: usize = 8192;

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.max_tokens > MAX_CHUNK_TOKENS {
        bail!("chunking.max_tokens must be <= {}", MAX_CHUNK_TOKENS);
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }

    // Validate retrieval
    if config.retrieval.default_k < 1 {
        bail!("retrieval.default_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }
    if config.retrieval.candidate_multiplier < 1 {
        bail!("retrieval.candidate_multiplier must be >= 1");
    }
    if config.retrieval.query_timeout_ms == 0 {
        bail!("retrieval.query_timeout_ms must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.concurrency == 0 {
        bail!("embedding.concurrency must be > 0");
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(config)
}
