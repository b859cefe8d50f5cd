//! # KB Engine CLI (`kbq`)
//!
//! The `kbq` binary is the primary interface for KB Engine. It provides
//! commands for knowledge-base ingestion, passage search, question
//! answering, and index inspection.
//!
//! ## Usage
//!
//! ```bash
//! kbq --config ./config/kbq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbq ingest <source> <file>` | Normalize, embed, and index an upload |
//! | `kbq search "<query>"` | Retrieve ranked passages across sources |
//! | `kbq ask "<question>"` | Answer a question over retrieved context |
//! | `kbq sources` | List sources that currently hold documents |
//! | `kbq stats` | Per-source document counts and dimensionality |
//!
//! ## Examples
//!
//! ```bash
//! # Index the Q&A knowledge base
//! kbq ingest qa ./data/qa.csv
//!
//! # Re-index property listings from scratch
//! kbq ingest property ./data/properties.csv --mode replace
//!
//! # Chunk and index a lease document
//! kbq ingest lease ./leases/unit-4b.txt
//!
//! # Search one source
//! kbq search "sublease consent" --source master_clauses
//!
//! # Answer over every source
//! kbq ask "What is the notice period for termination?"
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kb_engine::config;
use kb_engine::engine::QueryEngine;
use kb_engine::models::{IngestMode, QueryMode, QueryRequest, Source, SourceSelector};

/// KB Engine CLI — a retrieval-augmented query engine for lease
/// knowledge bases.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/kbq.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbq",
    about = "KB Engine — retrieval-augmented queries over lease knowledge bases",
    version,
    long_about = "KB Engine ingests tabular knowledge bases (Q&A, property listings, master \
    lease clauses) and free-text lease documents into per-source vector indexes, and answers \
    questions by routing, retrieving, and fusing ranked passages across them."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kbq.toml`. Storage, chunking, retrieval,
    /// embedding, and completion settings are read from this file.
    #[arg(long, global = true, default_value = "./config/kbq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest an upload into a source index.
    ///
    /// Normalizes the file for the declared source (CSV for qa,
    /// property, and master_clauses; plain text for lease), embeds the
    /// accepted documents, and writes them to the source's index.
    Ingest {
        /// Target source: `qa`, `property`, `master_clauses`, or `lease`.
        source: Source,

        /// Path to the upload (CSV or plain text, depending on source).
        file: PathBuf,

        /// `append` upserts into the existing index; `replace` rebuilds it
        /// from this upload alone.
        #[arg(long, default_value = "append")]
        mode: IngestMode,
    },

    /// Retrieve ranked passages without generating an answer.
    Search {
        /// The query text.
        query: String,

        /// Source selector: `auto`, `internal`, or a concrete source.
        #[arg(long, default_value = "auto")]
        source: SourceSelector,

        /// Query mode: `general` or `internal`.
        #[arg(long, default_value = "general")]
        mode: QueryMode,

        /// Number of passages to return (0 uses the configured default).
        #[arg(long, default_value_t = 0)]
        top_k: usize,
    },

    /// Answer a question over retrieved context.
    ///
    /// With a completion provider configured this generates an answer;
    /// with `completion.provider = "disabled"` it returns the best
    /// retrieved passage verbatim.
    Ask {
        /// The question text.
        question: String,

        /// Source selector: `auto`, `internal`, or a concrete source.
        #[arg(long, default_value = "auto")]
        source: SourceSelector,

        /// Query mode: `general` or `internal`.
        #[arg(long, default_value = "general")]
        mode: QueryMode,

        /// Number of passages to retrieve (0 uses the configured default).
        #[arg(long, default_value_t = 0)]
        top_k: usize,

        /// Attribute the conversation log entry to this user.
        #[arg(long)]
        user: Option<String>,
    },

    /// List sources that currently hold documents.
    Sources,

    /// Show per-source document counts and embedding dimensionality.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let engine = QueryEngine::from_config(cfg)?;

    match cli.command {
        Commands::Ingest { source, file, mode } => {
            let report = engine.ingest_file(&file, source, mode).await?;
            println!(
                "Ingested {} into '{}': {} accepted, {} skipped.",
                file.display(),
                report.source,
                report.accepted,
                report.skipped
            );
        }
        Commands::Search {
            query,
            source,
            mode,
            top_k,
        } => {
            let request = QueryRequest {
                text: query,
                source,
                mode,
                top_k,
            };
            let result = engine.retrieve(&request).await?;
            if result.is_empty() {
                println!("No passages matched.");
            } else {
                for (rank, p) in result.passages.iter().enumerate() {
                    println!(
                        "{}. [{}] {} (score {:.4})",
                        rank + 1,
                        p.source,
                        p.document_id,
                        p.score
                    );
                    println!("   {}", snippet(&p.text, 200));
                }
            }
        }
        Commands::Ask {
            question,
            source,
            mode,
            top_k,
            user,
        } => {
            let request = QueryRequest {
                text: question,
                source,
                mode,
                top_k,
            };
            let response = engine.ask(&request, user).await?;
            println!("{}", response.answer);
            if !response.cited_sources.is_empty() {
                println!();
                println!("Sources:");
                for cited in &response.cited_sources {
                    println!(
                        "  [{}] {} (score {:.4})",
                        cited.source, cited.document_id, cited.score
                    );
                }
            }
        }
        Commands::Sources => {
            let sources = engine.list_sources();
            if sources.is_empty() {
                println!("No sources hold documents yet.");
            } else {
                for source in sources {
                    println!("{source}");
                }
            }
        }
        Commands::Stats => {
            println!("{:<16} {:>10} {:>6}", "source", "documents", "dims");
            for source in Source::ALL {
                let stats = engine.stats(source);
                println!(
                    "{:<16} {:>10} {:>6}",
                    source.to_string(),
                    stats.document_count,
                    stats.dimensionality
                );
            }
        }
    }

    Ok(())
}

/// First `max` characters of `text` on one line, with an ellipsis when cut.
fn snippet(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.len() <= max {
        return flat;
    }
    let mut end = max;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &flat[..end])
}
