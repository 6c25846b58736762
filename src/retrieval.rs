//! Wiring between the configuration, the SQLite stores, and the core
//! [`HybridRetriever`].

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use research_rag_core::retriever::{HybridRetriever, DEFAULT_INDEX_ID};

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::{SqliteLexicalStorage, SqliteVectorIndex};

/// Open the retriever over `pool`.
///
/// The lexical side is always present. The vector side is attached only
/// when an embedding provider is configured.
pub async fn open_retriever(config: &Config, pool: &SqlitePool) -> Result<HybridRetriever> {
    let storage = Arc::new(SqliteLexicalStorage::new(pool.clone()));
    let retriever = HybridRetriever::open(storage, DEFAULT_INDEX_ID).await;

    match embedding::create_provider(&config.embedding)? {
        Some(provider) => {
            info!(model = provider.model_name(), dims = provider.dims(), "vector search enabled");
            let index = Arc::new(SqliteVectorIndex::new(pool.clone()));
            Ok(retriever.with_vectors(index, provider))
        }
        None => {
            info!("embeddings disabled, lexical search only");
            Ok(retriever)
        }
    }
}
