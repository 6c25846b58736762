//! Versioned schema migrations.
//!
//! Each migration runs once, in order, inside a transaction, and is
//! recorded in `schema_version`. `rag init` is therefore idempotent.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "documents, chunks, vectors, lexical snapshots",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                session_id TEXT,
                upload_date TEXT NOT NULL,
                total_pages INTEGER NOT NULL DEFAULT 0,
                total_chunks INTEGER NOT NULL DEFAULT 0,
                file_size INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id INTEGER PRIMARY KEY,
                document_id TEXT NOT NULL,
                source_file TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                session_id TEXT,
                FOREIGN KEY (document_id) REFERENCES documents(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id INTEGER PRIMARY KEY,
                session_id TEXT,
                source_file TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS lexical_snapshots (
                index_id TEXT PRIMARY KEY,
                saved_at INTEGER NOT NULL,
                entry_count INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS lexical_entries (
                index_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                PRIMARY KEY (index_id, position)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_documents_session ON documents(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_page ON chunks(source_file, page_number)",
            "CREATE INDEX IF NOT EXISTS idx_vectors_session ON chunk_vectors(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_vectors_source ON chunk_vectors(source_file)",
        ],
    },
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let applied = migrate_pool(&pool).await?;
    if applied > 0 {
        info!(applied, "schema migrated");
    }
    pool.close().await;
    Ok(())
}

/// Apply pending migrations; returns how many ran.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<usize> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await?;

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for stmt in migration.statements {
            sqlx::query(stmt)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {} failed", migration.version))?;
        }
        sqlx::query("INSERT INTO schema_version (version, applied_at, description) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now().timestamp())
            .bind(migration.description)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        applied += 1;
    }

    Ok(applied)
}
