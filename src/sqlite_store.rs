//! SQLite-backed persistence.
//!
//! - [`SqliteLexicalStorage`]: lexical snapshots, one row per indexed chunk
//!   in insertion order, so a reload rebuilds an identical index.
//! - [`SqliteVectorIndex`]: embeddings plus the metadata copy needed to
//!   filter. The scope predicate becomes the SQL `WHERE` clause; cosine
//!   similarity is then computed over the restricted rows.
//! - Document and chunk metadata: the `documents` and `chunks` tables.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use research_rag_core::lexical::LexicalRecord;
use research_rag_core::models::{Chunk, ScoredResult};
use research_rag_core::scope::ScopePredicate;
use research_rag_core::store::LexicalStorage;
use research_rag_core::vector::{blob_to_vec, check_batch, rank_by_similarity, vec_to_blob, VectorIndex};

// ============ Lexical snapshots ============

pub struct SqliteLexicalStorage {
    pool: SqlitePool,
}

impl SqliteLexicalStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LexicalStorage for SqliteLexicalStorage {
    async fn save(&self, index_id: &str, records: &[LexicalRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM lexical_entries WHERE index_id = ?")
            .bind(index_id)
            .execute(&mut *tx)
            .await?;

        for (position, record) in records.iter().enumerate() {
            let json = serde_json::to_string(record)?;
            sqlx::query(
                "INSERT INTO lexical_entries (index_id, position, record_json) VALUES (?, ?, ?)",
            )
            .bind(index_id)
            .bind(position as i64)
            .bind(json)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO lexical_snapshots (index_id, saved_at, entry_count) VALUES (?, ?, ?)
            ON CONFLICT(index_id) DO UPDATE SET
                saved_at = excluded.saved_at,
                entry_count = excluded.entry_count
            "#,
        )
        .bind(index_id)
        .bind(chrono::Utc::now().timestamp())
        .bind(records.len() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, index_id: &str) -> Result<Option<Vec<LexicalRecord>>> {
        let expected: Option<i64> =
            sqlx::query_scalar("SELECT entry_count FROM lexical_snapshots WHERE index_id = ?")
                .bind(index_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(expected) = expected else {
            return Ok(None);
        };

        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT record_json FROM lexical_entries WHERE index_id = ? ORDER BY position",
        )
        .bind(index_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() as i64 != expected {
            anyhow::bail!(
                "snapshot has {} entries, header says {}",
                rows.len(),
                expected
            );
        }

        let records = rows
            .iter()
            .enumerate()
            .map(|(i, json)| {
                serde_json::from_str(json).with_context(|| format!("entry {} is corrupt", i))
            })
            .collect::<Result<Vec<LexicalRecord>>>()?;
        Ok(Some(records))
    }
}

// ============ Vector index ============

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Append the predicate as a `WHERE` clause. Callers handle the
/// empty-universe case before building SQL.
fn push_scope_filter(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &ScopePredicate) {
    qb.push(" WHERE 1 = 1");
    if let Some(session) = &predicate.session_id {
        qb.push(" AND session_id = ").push_bind(session.clone());
    }
    if let Some(sources) = &predicate.allowed_sources {
        qb.push(" AND source_file IN (");
        let mut sep = qb.separated(", ");
        for source in sources {
            sep.push_bind(source.clone());
        }
        sep.push_unseparated(")");
    }
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    Chunk {
        chunk_id: row.get::<i64, _>("chunk_id") as u64,
        session_id: row.get("session_id"),
        source_file: row.get("source_file"),
        page_number: row.get::<i64, _>("page_number") as u32,
        token_count: row.get::<i64, _>("token_count") as usize,
        text: row.get("text"),
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        check_batch(chunks, embeddings)?;
        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunk_vectors
                    (chunk_id, session_id, source_file, page_number, token_count, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.chunk_id as i64)
            .bind(&chunk.session_id)
            .bind(&chunk.source_file)
            .bind(chunk.page_number as i64)
            .bind(chunk.token_count as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        predicate: &ScopePredicate,
    ) -> Result<Vec<ScoredResult>> {
        if predicate.is_empty_universe() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT chunk_id, session_id, source_file, page_number, token_count, text, embedding \
             FROM chunk_vectors",
        );
        push_scope_filter(&mut qb, predicate);
        let rows = qb.build().fetch_all(&self.pool).await?;

        let candidates: Vec<(Chunk, Vec<f32>)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (row_to_chunk(row), blob_to_vec(&blob))
            })
            .collect();

        Ok(rank_by_similarity(
            embedding,
            candidates.iter().map(|(c, v)| (c, v.as_slice())),
            top_k,
        ))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn correct_metadata(
        &self,
        chunk_id: u64,
        source_file: Option<&str>,
        page_number: Option<u32>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE chunk_vectors SET
                source_file = COALESCE(?, source_file),
                page_number = COALESCE(?, page_number)
            WHERE chunk_id = ?
            "#,
        )
        .bind(source_file)
        .bind(page_number.map(i64::from))
        .bind(chunk_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============ Documents and chunks ============

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub session_id: Option<String>,
    /// RFC 3339 timestamp.
    pub upload_date: String,
    pub total_pages: i64,
    pub total_chunks: i64,
    pub file_size: i64,
}

/// First unused chunk id: `MAX(chunk_id) + 1`, or 0 on an empty store.
pub async fn next_chunk_id(pool: &SqlitePool) -> Result<u64> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(chunk_id) FROM chunks")
        .fetch_one(pool)
        .await?;
    Ok(max.map(|m| m as u64 + 1).unwrap_or(0))
}

/// Record a document and its chunks in one transaction.
pub async fn insert_document(
    pool: &SqlitePool,
    document: &DocumentRecord,
    chunks: &[Chunk],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO documents (id, filename, session_id, upload_date, total_pages, total_chunks, file_size)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&document.id)
    .bind(&document.filename)
    .bind(&document.session_id)
    .bind(&document.upload_date)
    .bind(document.total_pages)
    .bind(document.total_chunks)
    .bind(document.file_size)
    .execute(&mut *tx)
    .await?;

    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (chunk_id, document_id, source_file, page_number, text, token_count, session_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk.chunk_id as i64)
        .bind(&document.id)
        .bind(&chunk.source_file)
        .bind(chunk.page_number as i64)
        .bind(&chunk.text)
        .bind(chunk.token_count as i64)
        .bind(&chunk.session_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Documents, newest first, optionally for one session.
pub async fn list_documents(
    pool: &SqlitePool,
    session_id: Option<&str>,
) -> Result<Vec<DocumentRecord>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, filename, session_id, upload_date, total_pages, total_chunks, file_size \
         FROM documents",
    );
    if let Some(session) = session_id {
        qb.push(" WHERE session_id = ").push_bind(session.to_string());
    }
    qb.push(" ORDER BY upload_date DESC, filename ASC, id ASC");

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| DocumentRecord {
            id: row.get("id"),
            filename: row.get("filename"),
            session_id: row.get("session_id"),
            upload_date: row.get("upload_date"),
            total_pages: row.get("total_pages"),
            total_chunks: row.get("total_chunks"),
            file_size: row.get("file_size"),
        })
        .collect())
}

const CHUNK_COLUMNS: &str = "chunk_id, session_id, source_file, page_number, token_count, text";

/// Every stored chunk, in id order.
pub async fn all_chunks(pool: &SqlitePool) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM chunks ORDER BY chunk_id",
        CHUNK_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_chunk).collect())
}

/// Chunks of one source file, in id order.
pub async fn chunks_for_source(pool: &SqlitePool, source_file: &str) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM chunks WHERE source_file = ? ORDER BY chunk_id",
        CHUNK_COLUMNS
    ))
    .bind(source_file)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_chunk).collect())
}

/// Correct the metadata copy in the `chunks` table.
pub async fn correct_chunk_metadata(
    pool: &SqlitePool,
    chunk_id: u64,
    source_file: Option<&str>,
    page_number: Option<u32>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE chunks SET
            source_file = COALESCE(?, source_file),
            page_number = COALESCE(?, page_number)
        WHERE chunk_id = ?
        "#,
    )
    .bind(source_file)
    .bind(page_number.map(i64::from))
    .bind(chunk_id as i64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete all documents and chunks. Index tables are cleared by the retriever.
pub async fn clear_documents(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}
