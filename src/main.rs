//! # docsort CLI
//!
//! The `docsort` binary builds a knowledge base from the documents you
//! already have, then files new documents next to the ones they resemble.
//!
//! ## Usage
//!
//! ```bash
//! docsort --config ./config/docsort.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsort init` | Write a default configuration file |
//! | `docsort build [DIR...]` | Ingest directories into the knowledge base |
//! | `docsort organize <FILE>` | Ask the agent where a file belongs and move it |
//! | `docsort search "<query>"` | Show the fragments retrieval would return |
//! | `docsort stats` | Summarize the knowledge base |
//!
//! ## Examples
//!
//! ```bash
//! # Start from scratch with the defaults
//! docsort init
//!
//! # Index your documents, replacing any previous build
//! docsort build ~/Documents --fresh-build
//!
//! # File a download, asking before the move
//! docsort organize ~/Downloads/invoice-0423.pdf
//!
//! # Same, without asking
//! docsort organize ~/Downloads/invoice-0423.pdf --force
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docsort::organize::OrganizeOutcome;
use docsort::{config, ingest, organize, search, stats};

/// docsort: a local-first agentic file organizer.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Run `docsort init` to generate one.
#[derive(Parser)]
#[command(
    name = "docsort",
    about = "docsort: a local-first agentic file organizer",
    version,
    long_about = "docsort extracts and chunks your existing documents into a local vector store, \
    then asks a language model where a new file belongs, validates the answer, and moves the \
    file there after you confirm."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsort.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file at the `--config` path.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Build the knowledge base from directories of existing documents.
    ///
    /// With no DIR arguments, `ingest.default_directories` is used.
    Build {
        /// Directories to ingest.
        dirs: Vec<PathBuf>,

        /// Delete the persisted store before ingesting.
        #[arg(long)]
        fresh_build: bool,
    },

    /// Decide where FILE belongs and move it there.
    Organize {
        /// The file to organize.
        file: PathBuf,

        /// Move without asking for confirmation.
        #[arg(long, short)]
        force: bool,
    },

    /// Show the fragments nearest to a query.
    Search {
        /// The query text.
        query: String,

        /// Number of results (defaults to `retrieval.n_results`).
        #[arg(short = 'k', long = "limit")]
        limit: Option<usize>,
    },

    /// Print knowledge-base statistics.
    Stats,
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "docsort=debug" } else { "docsort=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that don't require config
    if let Commands::Init { force } = cli.command {
        config::write_default_config(&cli.config, force)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Build { dirs, fresh_build } => {
            ingest::run_build(&cfg, &dirs, fresh_build).await?;
        }
        Commands::Organize { file, force } => {
            let outcome = organize::run_organize(&cfg, &file, force).await?;
            if let OrganizeOutcome::Skipped(reason) = outcome {
                anyhow::bail!("nothing to organize: {}", reason);
            }
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
