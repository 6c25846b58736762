//! Core data models that flow through ingest and retrieval.
//!
//! A [`Chunk`] is created once at ingest and is the unit both indices
//! store, score, and return. Its `chunk_id` is the join key between the
//! lexical index, the vector store, and the metadata store.

use serde::{Deserialize, Serialize};

/// One page of extracted text, as produced by a text source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub text: String,
    /// 1-based page number within `source_file`.
    pub page_number: u32,
    pub source_file: String,
}

/// A token-bounded span of source text; the atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub token_count: usize,
    pub source_file: String,
    pub page_number: u32,
    /// Globally unique, assigned monotonically at ingest.
    pub chunk_id: u64,
    pub session_id: Option<String>,
}

/// A single index's hit. `raw_score` is only comparable within one list.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    pub chunk: Chunk,
    pub raw_score: f64,
}

/// A chunk after fusion, carrying both normalized scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub chunk: Chunk,
    /// Normalized lexical score in `[0, 1]` (0.0 if absent from the lexical list).
    pub lexical_score: f64,
    /// Normalized vector score in `[0, 1]` (0.0 if absent from the vector list).
    pub vector_score: f64,
    pub combined_score: f64,
}

/// A deduplicated citation attached to a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCitation {
    pub source_file: String,
    pub page_number: u32,
    /// Excerpt of the best-scoring chunk for this page.
    pub chunk_text: String,
    pub relevance_score: f64,
}
