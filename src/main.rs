//! # DocQA CLI (`docqa`)
//!
//! The `docqa` binary drives the document question-answering pipeline:
//! copy files into managed storage, index them, and ask questions answered
//! from their content.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create storage directories and the empty index |
//! | `docqa ingest <paths..>` | Validate, copy, and index files |
//! | `docqa ingest-dir <dir>` | Ingest every supported file under a directory |
//! | `docqa index` | Index managed documents missing from the index |
//! | `docqa ask "<question>"` | Answer a question from the indexed documents |
//! | `docqa files` | List managed documents |
//! | `docqa remove <path>` | Delete one managed document |
//! | `docqa clear` | Clear documents, index, and/or history |
//! | `docqa stats` | Storage and index statistics |
//! | `docqa history` | Show recent exchanges |
//! | `docqa history-clear` | Delete the conversation history |
//! | `docqa status` | Check the model server and installed models |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a folder of papers
//! docqa ingest-dir ~/papers --config ./config/docqa.toml
//!
//! # Ask about them
//! docqa ask "What sample size did the second study use?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{commands, config, logging};

/// DocQA: ask questions about your own documents, answered by a local
/// model from the text you ingested.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "DocQA: local document question answering with retrieval-augmented generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create storage directories and the empty vector index.
    ///
    /// Idempotent: running it again keeps existing documents and index.
    Init,

    /// Validate files, copy them into managed storage, and index them.
    ///
    /// The whole batch is rejected if it exceeds the upload size or
    /// document count limits. Files whose content is already managed are
    /// not copied again, and are indexed only if they are not yet.
    Ingest {
        /// Files to ingest (.pdf, .txt, .md).
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Copy into managed storage without indexing.
        #[arg(long)]
        no_index: bool,
    },

    /// Ingest every supported file found under a directory.
    IngestDir {
        dir: PathBuf,

        /// Copy into managed storage without indexing.
        #[arg(long)]
        no_index: bool,
    },

    /// Index every managed document that has no chunks in the index yet.
    ///
    /// Picks up files copied with `--no-index` or left behind by a failed
    /// indexing step.
    Index,

    /// Answer a question from the indexed documents.
    ///
    /// The exchange is appended to the conversation history.
    Ask { question: String },

    /// List managed documents, newest first.
    Files,

    /// Delete a document from managed storage.
    ///
    /// Only paths inside managed storage are accepted. Indexed chunks of
    /// the file stay in the index until `docqa clear --index`.
    Remove { path: PathBuf },

    /// Clear stored state. With no flags, clears everything.
    Clear {
        /// Delete every managed document.
        #[arg(long)]
        files: bool,
        /// Delete every indexed chunk.
        #[arg(long)]
        index: bool,
        /// Delete the conversation history.
        #[arg(long)]
        history: bool,
    },

    /// Show storage and index statistics.
    Stats,

    /// Show recent question/answer exchanges.
    History {
        /// Number of most recent exchanges to show.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete the conversation history.
    HistoryClear,

    /// Check the model server and which configured models are installed.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    let _log_guard = logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Ingest { paths, no_index } => {
            commands::run_ingest(&cfg, &paths, no_index).await?;
        }
        Commands::IngestDir { dir, no_index } => {
            commands::run_ingest_dir(&cfg, &dir, no_index).await?;
        }
        Commands::Index => {
            commands::run_index(&cfg).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Files => {
            commands::run_files(&cfg)?;
        }
        Commands::Remove { path } => {
            commands::run_remove(&cfg, &path)?;
        }
        Commands::Clear {
            files,
            index,
            history,
        } => {
            commands::run_clear(&cfg, files, index, history).await?;
        }
        Commands::Stats => {
            commands::run_stats(&cfg).await?;
        }
        Commands::History { limit } => {
            commands::run_history(&cfg, limit)?;
        }
        Commands::HistoryClear => {
            commands::run_history_clear(&cfg)?;
        }
        Commands::Status => {
            commands::run_status(&cfg).await?;
        }
    }

    Ok(())
}
