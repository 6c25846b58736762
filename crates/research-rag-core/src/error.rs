//! Error taxonomy for ingest and retrieval.
//!
//! None of these are fatal to a query as a whole: the retriever catches
//! them per index (or per page at ingest), logs, and carries on with
//! whatever the other side produced.

use thiserror::Error;

/// Categorized retrieval failures.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A page or batch could not be chunked or indexed; it is skipped.
    #[error("ingest failed for {source_file}: {reason}")]
    Ingest { source_file: String, reason: String },

    /// A persistent index could not be loaded.
    #[error("index '{index}' unavailable: {reason}")]
    IndexUnavailable { index: String, reason: String },

    /// One index failed while answering a query.
    #[error("{index} query failed: {reason}")]
    Query { index: &'static str, reason: String },

    /// The requested scope cannot be resolved (e.g. no session id).
    #[error("unresolvable scope: {0}")]
    Scope(String),

    /// The embedding provider returned an error or a malformed batch.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A storage backend rejected a write.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RetrievalError {
    pub fn query(index: &'static str, err: impl std::fmt::Display) -> Self {
        RetrievalError::Query {
            index,
            reason: err.to_string(),
        }
    }
}
