//! Corpus management commands: listing, statistics, clearing, metadata
//! correction, and page lookup.
//!
//! Stored metadata lives in three places (the `chunks` table, the lexical
//! snapshot, and the vector rows). `clear` and `correct` touch all three.

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::info;

use research_rag_core::retriever::RetrieverStats;

use crate::config::Config;
use crate::db;
use crate::retrieval;
use crate::sqlite_store::{self, DocumentRecord};

pub async fn run_documents(config: &Config, session_id: Option<&str>, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let documents = sqlite_store::list_documents(&pool, session_id).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
        return Ok(());
    }

    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &documents {
        print_document(doc);
    }
    println!("{} document(s)", documents.len());
    Ok(())
}

fn print_document(doc: &DocumentRecord) {
    println!("{}", doc.filename);
    println!("    id: {}", doc.id);
    println!(
        "    session: {}",
        doc.session_id.as_deref().unwrap_or("(none)")
    );
    println!("    uploaded: {}", doc.upload_date);
    println!(
        "    pages: {}  chunks: {}  size: {}",
        doc.total_pages,
        doc.total_chunks,
        format_bytes(doc.file_size.max(0) as u64)
    );
    println!();
}

#[derive(Debug, Serialize)]
struct CorpusStats {
    documents: i64,
    chunks: i64,
    sessions: i64,
    #[serde(flatten)]
    index: RetrieverStats,
}

pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let retriever = retrieval::open_retriever(config, &pool).await?;

    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;
    let sessions: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT session_id) FROM documents")
            .fetch_one(&pool)
            .await?;
    let stats = CorpusStats {
        documents,
        chunks,
        sessions,
        index: retriever.stats().await?,
    };
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Corpus Stats");
    println!("============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Sessions:    {}", stats.sessions);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Lexical:     {}", stats.index.lexical_chunks);
    match (&stats.index.vector_chunks, &stats.index.embedding_model) {
        (Some(count), Some(model)) => println!("  Vectors:     {} ({})", count, model),
        _ => println!("  Vectors:     disabled"),
    }
    Ok(())
}

/// Delete every document, chunk, and index entry.
pub async fn run_clear(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let retriever = retrieval::open_retriever(config, &pool).await?;

    retriever.clear().await?;
    sqlite_store::clear_documents(&pool).await?;
    info!("corpus cleared");

    println!("Cleared all documents and indices.");
    pool.close().await;
    Ok(())
}

/// Correct a chunk's source file and/or page number everywhere it is stored.
pub async fn run_correct(
    config: &Config,
    chunk_id: u64,
    source_file: Option<&str>,
    page_number: Option<u32>,
) -> Result<()> {
    if source_file.is_none() && page_number.is_none() {
        bail!("Nothing to correct: pass --source-file and/or --page");
    }
    if page_number == Some(0) {
        bail!("--page must be >= 1");
    }

    let pool = db::connect(config).await?;
    let retriever = retrieval::open_retriever(config, &pool).await?;

    let in_table =
        sqlite_store::correct_chunk_metadata(&pool, chunk_id, source_file, page_number).await?;
    let in_index = retriever
        .correct_metadata(chunk_id, source_file, page_number)
        .await?;
    pool.close().await;

    if !in_table && !in_index {
        bail!("No chunk with id {}", chunk_id);
    }
    info!(chunk_id, ?source_file, ?page_number, "corrected chunk metadata");
    println!("Corrected chunk {}.", chunk_id);
    Ok(())
}

/// Print the chunks of one page, in order.
pub async fn run_page(config: &Config, source_file: &str, page_number: u32) -> Result<()> {
    let pool = db::connect(config).await?;
    let retriever = retrieval::open_retriever(config, &pool).await?;
    let chunks = retriever.chunks_for_page(source_file, page_number)?;
    pool.close().await;

    if chunks.is_empty() {
        println!("No chunks for {} page {}.", source_file, page_number);
        return Ok(());
    }

    println!("--- {} / page {} ---", source_file, page_number);
    for chunk in &chunks {
        println!("[chunk {}, {} tokens]", chunk.chunk_id, chunk.token_count);
        println!("{}", chunk.text);
        println!();
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
