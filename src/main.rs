//! # notes-rag CLI
//!
//! ## Usage
//!
//! ```bash
//! notes-rag --config ./config/notes-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notes-rag retrieve --notes <file\|text>` | Retrieve a bounded context from notes |
//! | `notes-rag check --notes <file\|text>` | Run only the input guard |
//! | `notes-rag chunks --notes <file\|text>` | Show how notes are chunked |
//! | `notes-rag serve` | Start the HTTP server |
//! | `notes-rag stats` | Summarize the telemetry log |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use notes_rag::config::{self, Config};
use notes_rag::{retrieve, server, stats};

const DEFAULT_CONFIG_PATH: &str = "./config/notes-rag.toml";

/// Retrieval front half of a notes-to-quiz generator.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/notes-rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "notes-rag",
    about = "Guard, chunk, embed, and rank study notes into a bounded quiz-generation context",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/notes-rag.toml`. Built-in defaults are used when
    /// that default file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve a bounded context from notes.
    ///
    /// Prints the assembled context on stdout and a one-line summary on
    /// stderr. Rejected input exits non-zero.
    Retrieve {
        /// Notes file path, `-` for stdin, or the notes text itself.
        #[arg(long)]
        notes: String,

        /// Topic to rank chunks against. Defaults to `[retrieval].default_query`.
        #[arg(long, default_value = "")]
        topic: String,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run only the input guard and print its verdict.
    Check {
        #[arg(long)]
        notes: String,
        #[arg(long, default_value = "")]
        topic: String,
    },

    /// Show the chunker's output for some notes.
    Chunks {
        #[arg(long)]
        notes: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Summarize the telemetry log.
    Stats {
        /// Also print the last N records.
        #[arg(long)]
        tail: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Retrieve { notes, topic, json } => {
            let notes = retrieve::read_notes(&notes)?;
            retrieve::run_retrieve(&cfg, &notes, &topic, json).await?;
        }
        Commands::Check { notes, topic } => {
            let notes = retrieve::read_notes(&notes)?;
            retrieve::run_check(&cfg, &notes, &topic)?;
        }
        Commands::Chunks { notes } => {
            let notes = retrieve::read_notes(&notes)?;
            retrieve::run_chunks(&cfg, &notes)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats { tail } => {
            stats::run_stats(&cfg, tail)?;
        }
    }

    Ok(())
}
