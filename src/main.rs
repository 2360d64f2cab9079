//! # DocQA CLI (`docqa`)
//!
//! Command-line front end for the document question-answering service.
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
//! | `docqa init` | Create the databases and vector indexes |
//! | `docqa upload <path> --user U` | Store a file and record it as not processed |
//! | `docqa list --user U` | List a user's documents, newest first |
//! | `docqa process <id> --user U` | Extract, chunk, embed, and index a document |
//! | `docqa delete <id> --user U` | Delete a document with its vectors and bytes |
//! | `docqa ask "<query>" [--user U]` | Ask the public corpus, or U's private corpus |
//! | `docqa history --user U` | Show U's recent private exchanges |
//! | `docqa reconcile` | Retry cleanups left by failed deletions |
//! | `docqa stats` | Show document, vector, and conversation counts |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `docqa=info`).
//!
//! Exit status is `0` on success, `2` when the request itself was rejected
//! (bad query, unknown id, permission denied, ...) and `1` for any other
//! failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::config::{self, Config};
use docqa::lifecycle::Step;
use docqa::models::{format_ts, Citation, Conversation, Corpus, UserId};
use docqa::stats::{file_size, format_bytes};
use docqa::{DocQa, ServiceError};

/// DocQA: ask questions about your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "DocQA: retrieval-augmented question answering over uploaded documents",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the relational store, byte store, and both vector indexes.
    ///
    /// Idempotent: safe to run repeatedly.
    Init,

    /// Upload a file. The stored name is the file's base name.
    Upload {
        path: PathBuf,

        #[arg(long)]
        user: String,

        /// Target corpus: `public` or `private`.
        #[arg(long, default_value = "public")]
        corpus: Corpus,
    },

    /// List your documents, newest upload first.
    List {
        #[arg(long)]
        user: String,
    },

    /// Process (or reprocess) a document you own.
    Process {
        id: String,

        #[arg(long)]
        user: String,
    },

    /// Delete a document you own.
    Delete {
        id: String,

        #[arg(long)]
        user: String,
    },

    /// Ask a question. With `--user`, asks that user's private documents.
    Ask {
        query: String,

        #[arg(long)]
        user: Option<String>,
    },

    /// Show your recent private exchanges, oldest first.
    History {
        #[arg(long)]
        user: String,
    },

    /// Retry cleanups left behind by partially failed deletions.
    Reconcile,

    /// Show store statistics.
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docqa=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code(&e)
        }
    }
}

fn exit_code(e: &anyhow::Error) -> ExitCode {
    match e.downcast_ref::<ServiceError>() {
        Some(e) if e.is_client_error() => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config(&cli.config)?;
    let app = DocQa::open(&cfg).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}", cfg.db.path.display());
            println!("Public index at {}", cfg.index.public_dir.display());
            println!("Private index at {}", cfg.index.private_dir.display());
        }
        Commands::Upload { path, user, corpus } => {
            let filename = base_name(&path)?;
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let doc = app
                .create_document(&UserId::new(user), &filename, &bytes, corpus)
                .await?;
            println!("{}", doc.id);
        }
        Commands::List { user } => {
            let docs = app.list_documents(&UserId::new(user)).await?;
            if docs.is_empty() {
                println!("No documents.");
                return Ok(());
            }
            println!(
                "{:<36}  {:<8}  {:<18}  {:<19}  FILENAME",
                "ID", "CORPUS", "STATUS", "UPLOADED"
            );
            for doc in docs {
                println!(
                    "{:<36}  {:<8}  {:<18}  {:<19}  {}",
                    doc.id,
                    doc.corpus.as_str(),
                    doc.status.as_str(),
                    format_ts(doc.uploaded_at),
                    doc.filename
                );
            }
        }
        Commands::Process { id, user } => {
            let status = app.process_document(&UserId::new(user), &id).await?;
            println!("{}", status);
        }
        Commands::Delete { id, user } => {
            let report = app.delete_document(&UserId::new(user), &id).await?;
            println!("Deleted {} ({})", report.filename, report.document_id);
            match &report.embeddings {
                Step::Done(n) => println!("  embeddings: {} removed", n),
                Step::Failed(e) => println!("  embeddings: FAILED ({})", e),
            }
            match &report.bytes {
                Step::Done(true) => println!("  bytes: removed"),
                Step::Done(false) => println!("  bytes: already absent"),
                Step::Failed(e) => println!("  bytes: FAILED ({})", e),
            }
            if let Some(id) = report.pending_cleanup {
                println!("  queued for `docqa reconcile` (cleanup #{})", id);
            }
        }
        Commands::Ask { query, user } => match user {
            None => {
                let answer = app.ask_public(&query).await?;
                println!("{}", answer.answer);
                print_sources(&answer.sources);
            }
            Some(user) => {
                let user = UserId::new(user);
                let answer = app.ask_private(Some(&user), &query).await?;
                println!("{}", answer.answer);
                print_sources(&answer.sources);
                if !answer.history.is_empty() {
                    println!();
                    println!("Recent:");
                    print_history(&answer.history);
                }
            }
        },
        Commands::History { user } => {
            let history = app.private_history(Some(&UserId::new(user))).await?;
            if history.is_empty() {
                println!("No history.");
            } else {
                print_history(&history);
            }
        }
        Commands::Reconcile => {
            let resolved = app.reconcile().await?;
            println!("{} cleanup(s) resolved", resolved);
        }
        Commands::Stats => {
            let stats = app.stats().await?;
            println!("DocQA Stats");
            println!("===========");
            println!();
            print_store_size(&cfg);
            println!();
            println!("{}", stats);
        }
    }

    Ok(())
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("No usable file name in {}", path.display()))
}

fn print_sources(sources: &[Citation]) {
    if sources.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, c) in sources.iter().enumerate() {
        let location = match c.page {
            Some(page) => format!("{} (page {})", c.source, page),
            None => c.source.clone(),
        };
        println!("  [{}] {}", i + 1, location);
        println!("      {}", c.content.replace('\n', " "));
    }
}

fn print_history(history: &[Conversation]) {
    for c in history {
        println!("  [{}] Q: {}", format_ts(c.created_at), c.query);
        println!("  {:>21} A: {}", "", c.answer);
    }
}

fn print_store_size(cfg: &Config) {
    let index_file = docqa::sqlite_index::INDEX_FILE;
    println!(
        "  Database:      {} ({})",
        cfg.db.path.display(),
        format_bytes(file_size(&cfg.db.path))
    );
    println!(
        "  Public index:  {} ({})",
        cfg.index.public_dir.display(),
        format_bytes(file_size(&cfg.index.public_dir.join(index_file)))
    );
    println!(
        "  Private index: {} ({})",
        cfg.index.private_dir.display(),
        format_bytes(file_size(&cfg.index.private_dir.join(index_file)))
    );
}
