//! # deskrag CLI
//!
//! Manage the knowledge base and run the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! deskrag --config ./config/deskrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `deskrag init` | Create the SQLite database and run schema migrations |
//! | `deskrag add <file>` | Add one file as a document (new version if the title exists) |
//! | `deskrag import <dir>` | Batch-import `.md` / `.txt` files |
//! | `deskrag reprocess` | Rebuild chunks and embeddings for active documents |
//! | `deskrag query "<question>"` | Answer a question from the knowledge base |
//! | `deskrag stats` | Print document and chunk counts |
//! | `deskrag serve` | Start the HTTP action API |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use deskrag::progress::ProgressMode;
use deskrag::{ask, config, import, migrate, server, stats};
use deskrag_core::models::DocType;

/// deskrag: a support-desk knowledge base with retrieval-augmented answers.
#[derive(Parser)]
#[command(name = "deskrag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/deskrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Add a single file as a document.
    Add {
        /// Path to a text or markdown file.
        path: PathBuf,

        /// Document title. Defaults to the file stem.
        #[arg(long)]
        title: Option<String>,

        /// One of `faq`, `policy`, `help_article`, `api_doc`.
        #[arg(long = "type", default_value = "help_article")]
        doc_type: DocType,

        /// Metadata as a JSON object, e.g. `{"department":"billing","tags":["refunds"]}`.
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Import every `.md` / `.txt` file under a directory.
    Import {
        dir: PathBuf,

        #[arg(long = "type", default_value = "help_article")]
        doc_type: DocType,

        /// Documents processed at once. Defaults to `[processing].batch_concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,

        /// List the files without touching the database.
        #[arg(long)]
        dry_run: bool,

        /// Progress output: `off`, `human` or `json`. Human when stderr is a TTY.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Rebuild chunks and embeddings, e.g. after changing the embedding model.
    Reprocess {
        /// Only documents of this type.
        #[arg(long = "type")]
        doc_type: Option<DocType>,

        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Ask a question.
    Query {
        question: String,

        #[arg(long)]
        max_chunks: Option<usize>,

        #[arg(long)]
        threshold: Option<f64>,

        /// Restrict retrieval to one document id.
        #[arg(long)]
        document: Option<String>,

        /// Print the raw result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show knowledge-base statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    match s {
        "off" => Ok(ProgressMode::Off),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        other => Err(format!(
            "invalid progress mode '{}': expected off, human, or json",
            other
        )),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            path,
            title,
            doc_type,
            metadata,
        } => {
            import::run_add(&cfg, &path, title, doc_type, metadata.as_deref()).await?;
        }
        Commands::Import {
            dir,
            doc_type,
            concurrency,
            dry_run,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let failed =
                import::run_import(&cfg, &dir, doc_type, concurrency, dry_run, progress).await?;
            if failed > 0 {
                bail!("{} documents failed to import", failed);
            }
        }
        Commands::Reprocess { doc_type, progress } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let failed = import::run_reprocess(&cfg, doc_type, progress).await?;
            if failed > 0 {
                bail!("{} documents failed to reprocess", failed);
            }
        }
        Commands::Query {
            question,
            max_chunks,
            threshold,
            document,
            json,
        } => {
            ask::run_query(&cfg, &question, max_chunks, threshold, document, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
