//! # Lore Harness CLI (`lore`)
//!
//! Indexes a directory of lore files and answers natural-language queries
//! against it, by vector similarity when an embedding provider is
//! configured and by lexical overlap otherwise.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore init` | Create the SQLite database and schema |
//! | `lore sync` | Reconcile the index with the lore directory |
//! | `lore rebuild` | Re-chunk and re-embed every file |
//! | `lore search "<query>"` | Ranked chunks for a query |
//! | `lore context "<query>"` | Top chunks formatted as prompt context |
//! | `lore topics` | List indexed topics |
//! | `lore get <topic>` | Print the source file of a topic |
//! | `lore status` | Index summary |
//!
//! ## Examples
//!
//! ```bash
//! lore init --config ./config/lore.toml
//! lore sync --config ./config/lore.toml
//! lore search "who guards the northern pass" --k 3
//! RUST_LOG=lore_core=debug lore sync
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lore_harness::{config, get, ingest, migrate, search, stats};

/// Lore Harness: retrieval over a directory of world lore.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lore.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lore",
    about = "Lore Harness: incremental indexing and retrieval over a lore directory",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Scan the lore directory and bring the index up to date.
    ///
    /// Only files whose content or embedding model changed are re-chunked
    /// and re-embedded. Files no longer on disk are dropped.
    Sync,

    /// Re-chunk and re-embed every file regardless of content hashes.
    Rebuild,

    /// Search indexed lore.
    Search {
        /// The search query.
        query: String,

        /// Number of results (defaults to `retrieval.default_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the top hits for a query as a prompt-ready context block.
    Context {
        query: String,

        #[arg(long)]
        k: Option<usize>,
    },

    /// List indexed topics.
    Topics,

    /// Print the lore file behind a topic.
    Get {
        /// Topic name (lowercase file stem, e.g. `dragons`).
        topic: String,
    },

    /// Show index statistics.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync => {
            ingest::run_sync(&cfg).await?;
        }
        Commands::Rebuild => {
            ingest::run_rebuild(&cfg).await?;
        }
        Commands::Search { query, k, json } => {
            search::run_search(&cfg, &query, k, json).await?;
        }
        Commands::Context { query, k } => {
            search::run_context(&cfg, &query, k).await?;
        }
        Commands::Topics => {
            get::run_topics(&cfg).await?;
        }
        Commands::Get { topic } => {
            get::run_get(&cfg, &topic).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}
