//! # Research RAG CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag ingest <paths>...` | Upload files or directories as one session |
//! | `rag search "<query>"` | Hybrid search within a scope |
//! | `rag ask "<question>"` | Answer a question from retrieved pages, with citations |
//! | `rag summarize <file>` | Summarize one uploaded document |
//! | `rag documents` | List uploaded documents |
//! | `rag page <file> <page>` | Show the chunks of one page |
//! | `rag correct <chunk_id>` | Fix a chunk's source file or page number |
//! | `rag reindex` | Rebuild both indices from stored chunks |
//! | `rag stats` | Corpus and index counts |
//! | `rag clear` | Delete all documents and index entries |
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `info`).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use research_rag::{admin, config, ingest, migrate, search};
use research_rag_core::scope::ScopeKind;

/// Research RAG: hybrid keyword + semantic retrieval over your documents,
/// with cited answers.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Research RAG: hybrid retrieval over uploaded documents, with cited answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Extract, chunk, and index files as one upload session.
    ///
    /// Directories are walked recursively. Supported: .pdf, .txt, .md.
    Ingest {
        /// Files or directories to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Session id to ingest into. A new UUID is generated if omitted.
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Search the corpus.
    Search {
        query: String,

        #[command(flatten)]
        query_args: QueryFlags,
    },

    /// Answer a question from the retrieved pages.
    Ask {
        question: String,

        #[command(flatten)]
        query_args: QueryFlags,
    },

    /// Summarize one uploaded document.
    Summarize {
        /// Source file name as shown by `rag documents`.
        source_file: String,
    },

    /// List uploaded documents, newest first.
    Documents {
        #[arg(long)]
        session_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show the chunks of one page.
    Page { source_file: String, page: u32 },

    /// Correct a chunk's source file and/or page number.
    Correct {
        chunk_id: u64,

        #[arg(long)]
        source_file: Option<String>,

        #[arg(long)]
        page: Option<u32>,
    },

    /// Rebuild the keyword and vector indices from stored chunks.
    Reindex,

    /// Show corpus and index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Delete all documents, chunks, and index entries.
    Clear,
}

/// Scope and ranking flags for `search` and `ask`.
#[derive(Args)]
struct QueryFlags {
    /// session, selected, or all. Inferred from --session-id / --source when omitted.
    #[arg(long)]
    scope: Option<ScopeKind>,

    #[arg(long)]
    session_id: Option<String>,

    /// Restrict to these source files (repeatable).
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Number of results to return.
    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long)]
    lexical_weight: Option<f64>,

    #[arg(long)]
    vector_weight: Option<f64>,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

impl From<QueryFlags> for search::QueryArgs {
    fn from(flags: QueryFlags) -> Self {
        search::QueryArgs {
            scope: flags.scope,
            session_id: flags.session_id,
            sources: flags.sources,
            top_k: flags.top_k,
            lexical_weight: flags.lexical_weight,
            vector_weight: flags.vector_weight,
            json: flags.json,
        }
    }
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
        Commands::Ingest { paths, session_id } => {
            ingest::run_ingest(&cfg, &paths, session_id).await?;
        }
        Commands::Search { query, query_args } => {
            search::run_search(&cfg, &query, &query_args.into()).await?;
        }
        Commands::Ask {
            question,
            query_args,
        } => {
            search::run_ask(&cfg, &question, &query_args.into()).await?;
        }
        Commands::Summarize { source_file } => {
            search::run_summarize(&cfg, &source_file).await?;
        }
        Commands::Documents { session_id, json } => {
            admin::run_documents(&cfg, session_id.as_deref(), json).await?;
        }
        Commands::Page { source_file, page } => {
            admin::run_page(&cfg, &source_file, page).await?;
        }
        Commands::Correct {
            chunk_id,
            source_file,
            page,
        } => {
            admin::run_correct(&cfg, chunk_id, source_file.as_deref(), page).await?;
        }
        Commands::Reindex => {
            ingest::run_reindex(&cfg).await?;
        }
        Commands::Stats { json } => {
            admin::run_stats(&cfg, json).await?;
        }
        Commands::Clear => {
            admin::run_clear(&cfg).await?;
        }
    }

    Ok(())
}
