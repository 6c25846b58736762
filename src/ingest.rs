//! Ingestion pipeline.
//!
//! files → page extraction → chunking → `documents`/`chunks` tables →
//! hybrid indices. Every run is one upload session: all files ingested
//! together share a session id (given, or a fresh UUID), which is what
//! session-scoped search filters on.
//!
//! A file that cannot be read, parsed, or stored is logged and skipped; the
//! rest of the batch still lands and is indexed.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use research_rag_core::chunk::Chunker;
use research_rag_core::models::Chunk;
use research_rag_core::retriever::HybridRetriever;

use crate::config::Config;
use crate::db;
use crate::extract::{self, SourceKind};
use crate::retrieval;
use crate::sqlite_store::{self, DocumentRecord};

/// Outcome of one ingest run.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub session_id: String,
    pub files_processed: usize,
    pub chunks_written: usize,
    pub embeddings_written: usize,
    /// Paths that were skipped, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    session_id: Option<String>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let retriever = retrieval::open_retriever(config, &pool).await?;

    let summary = ingest_paths(config, &pool, &retriever, paths, session_id).await?;

    println!("ingest");
    println!("  session: {}", summary.session_id);
    println!("  files processed: {}", summary.files_processed);
    println!("  chunks written: {}", summary.chunks_written);
    if retriever.has_vectors() {
        println!("  embeddings written: {}", summary.embeddings_written);
    }
    println!("  skipped: {}", summary.skipped.len());
    for (path, reason) in &summary.skipped {
        println!("    {}: {}", path.display(), reason);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Ingest `paths` (files or directories) as one session.
pub async fn ingest_paths(
    config: &Config,
    pool: &SqlitePool,
    retriever: &HybridRetriever,
    paths: &[PathBuf],
    session_id: Option<String>,
) -> Result<IngestSummary> {
    let session_id = match session_id {
        Some(id) if id.trim().is_empty() => bail!("session id must not be empty"),
        Some(id) => id,
        None => Uuid::new_v4().to_string(),
    };

    let mut summary = IngestSummary {
        session_id: session_id.clone(),
        ..IngestSummary::default()
    };
    let files = collect_files(paths, &mut summary.skipped);
    if files.is_empty() {
        warn!("no supported files to ingest");
        return Ok(summary);
    }

    let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
    let mut next_id = sqlite_store::next_chunk_id(pool).await?;
    let mut batch: Vec<Chunk> = Vec::new();

    for path in &files {
        let source_file = display_name(path);
        let pages = match extract::extract_file(path, &source_file) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{:#}", e), "skipping file");
                summary.skipped.push((path.clone(), format!("{:#}", e)));
                continue;
            }
        };

        let chunks = chunker.split(&pages, next_id, Some(&session_id));
        if chunks.is_empty() {
            warn!(path = %path.display(), "no extractable text, skipping file");
            summary
                .skipped
                .push((path.clone(), "no extractable text".to_string()));
            continue;
        }

        let document = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            filename: source_file.clone(),
            session_id: Some(session_id.clone()),
            upload_date: chrono::Utc::now().to_rfc3339(),
            total_pages: pages.len() as i64,
            total_chunks: chunks.len() as i64,
            file_size: std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0),
        };
        if let Err(e) = sqlite_store::insert_document(pool, &document, &chunks).await {
            warn!(path = %path.display(), error = %format!("{:#}", e), "storing document failed, skipping file");
            summary.skipped.push((path.clone(), format!("{:#}", e)));
            continue;
        }
        if let Some(last) = chunks.last() {
            next_id = last.chunk_id + 1;
        }
        debug!(file = %source_file, pages = pages.len(), chunks = chunks.len(), "stored document");

        summary.files_processed += 1;
        summary.chunks_written += chunks.len();
        batch.extend(chunks);
    }

    let report = retriever.add_documents(&batch).await?;
    summary.embeddings_written = report.vectors_added;

    info!(
        session = %session_id,
        files = summary.files_processed,
        chunks = summary.chunks_written,
        embeddings = summary.embeddings_written,
        skipped = summary.skipped.len(),
        "ingest complete"
    );
    Ok(summary)
}

/// Rebuild both indices from the `chunks` table.
pub async fn run_reindex(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let retriever = retrieval::open_retriever(config, &pool).await?;

    let chunks = sqlite_store::all_chunks(&pool).await?;
    let report = retriever.build_indices(&chunks).await?;

    println!("reindex");
    println!("  chunks indexed: {}", report.lexical_added);
    if retriever.has_vectors() {
        println!("  embeddings written: {}", report.vectors_added);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Expand directories and keep supported files, sorted for a stable id
/// assignment. Explicitly named files of an unsupported type are reported
/// as skipped; inside directories they are ignored.
fn collect_files(paths: &[PathBuf], skipped: &mut Vec<(PathBuf, String)>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(error = %e, "unreadable directory entry");
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| SourceKind::from_path(p).is_some())
                .collect();
            found.sort();
            files.extend(found);
        } else if !path.exists() {
            skipped.push((path.clone(), "file not found".to_string()));
        } else if SourceKind::from_path(path).is_none() {
            skipped.push((path.clone(), "unsupported file type".to_string()));
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::migrate;
    use research_rag_core::retriever::SearchOptions;
    use research_rag_core::scope::ScopePredicate;
    use tempfile::TempDir;

    async fn setup() -> (Config, SqlitePool, HybridRetriever) {
        let config = parse_config("[db]\npath = \":memory:\"\n").unwrap();
        let pool = db::connect_in_memory().await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        let retriever = retrieval::open_retriever(&config, &pool).await.unwrap();
        (config, pool, retriever)
    }

    #[tokio::test]
    async fn test_ingest_directory_assigns_session_and_ids() {
        let (config, pool, retriever) = setup().await;
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "Neural networks learn representations.").unwrap();
        std::fs::write(tmp.path().join("b.md"), "Tomato soup\x0cneeds basil").unwrap();
        std::fs::write(tmp.path().join("c.png"), [0u8, 1, 2]).unwrap();

        let summary = ingest_paths(
            &config,
            &pool,
            &retriever,
            &[tmp.path().to_path_buf()],
            Some("s1".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(summary.session_id, "s1");
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.chunks_written, 3);
        assert!(summary.skipped.is_empty());

        let chunks = sqlite_store::all_chunks(&pool).await.unwrap();
        let ids: Vec<u64> = chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.session_id.as_deref() == Some("s1")));
        assert_eq!(chunks[2].source_file, "b.md");
        assert_eq!(chunks[2].page_number, 2);

        let results = retriever
            .hybrid_search("basil", &SearchOptions::default(), &ScopePredicate::for_session("s1"))
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, 2);
    }

    #[tokio::test]
    async fn test_ingest_continues_ids_and_generates_session() {
        let (config, pool, retriever) = setup().await;
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("one.txt");
        std::fs::write(&file, "first upload").unwrap();

        let first = ingest_paths(&config, &pool, &retriever, &[file.clone()], None)
            .await
            .unwrap();
        let second = ingest_paths(&config, &pool, &retriever, &[file], None)
            .await
            .unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert!(Uuid::parse_str(&first.session_id).is_ok());
        assert_eq!(sqlite_store::next_chunk_id(&pool).await.unwrap(), 2);
        assert_eq!(retriever.stats().await.unwrap().lexical_chunks, 2);
    }

    #[tokio::test]
    async fn test_bad_files_are_skipped() {
        let (config, pool, retriever) = setup().await;
        let tmp = TempDir::new().unwrap();
        let bad_pdf = tmp.path().join("broken.pdf");
        std::fs::write(&bad_pdf, b"not a pdf").unwrap();
        let empty = tmp.path().join("empty.txt");
        std::fs::write(&empty, "   ").unwrap();
        let good = tmp.path().join("good.txt");
        std::fs::write(&good, "useful words").unwrap();
        let image = tmp.path().join("photo.png");
        std::fs::write(&image, [0u8]).unwrap();

        let summary = ingest_paths(
            &config,
            &pool,
            &retriever,
            &[bad_pdf, empty, good, image, tmp.path().join("missing.txt")],
            Some("s".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.skipped.len(), 4);
        assert_eq!(sqlite_store::list_documents(&pool, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_skips_file_and_indexes_the_rest() {
        let (config, pool, retriever) = setup().await;
        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON documents
             WHEN NEW.filename = 'bad.txt'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "gradient descent converges").unwrap();
        std::fs::write(tmp.path().join("bad.txt"), "this upload is rejected").unwrap();
        std::fs::write(tmp.path().join("c.txt"), "stochastic gradient noise").unwrap();

        let summary = ingest_paths(
            &config,
            &pool,
            &retriever,
            &[tmp.path().to_path_buf()],
            Some("s".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].0.ends_with("bad.txt"));

        let ids: Vec<u64> = sqlite_store::all_chunks(&pool)
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_id)
            .collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(retriever.stats().await.unwrap().lexical_chunks, 2);

        let results = retriever
            .hybrid_search("gradient", &SearchOptions::default(), &ScopePredicate::for_session("s"))
            .await;
        assert_eq!(results.len(), 2);
        let rejected = retriever
            .hybrid_search("rejected", &SearchOptions::default(), &ScopePredicate::unrestricted())
            .await;
        assert!(rejected.is_empty());
    }

    #[tokio::test]
    async fn test_empty_session_id_rejected() {
        let (config, pool, retriever) = setup().await;
        let result =
            ingest_paths(&config, &pool, &retriever, &[], Some("  ".to_string())).await;
        assert!(result.is_err());
    }
}
