//! Vector index contract and similarity utilities.
//!
//! The ANN/vector-store engine is an external collaborator; this module
//! fixes the contract every backend must honor:
//!
//! - `add` takes exactly one embedding per chunk, in the same order.
//! - `query` restricts the search to entries matching the
//!   [`ScopePredicate`] **inside** the search. Post-filtering a fixed-size
//!   neighbor list is not acceptable: a narrow scope would silently starve
//!   the result set.
//! - Scores are "higher is better": cosine similarity, i.e.
//!   `1 − cosine distance`. Ties are ordered by ascending `chunk_id`.
//! - Every in-scope neighbor is a candidate, whatever its similarity. A
//!   scope holding fewer than `top_k` vectors returns all of them.
//!
//! Two backends exist: [`InMemoryVectorIndex`](crate::store::memory::InMemoryVectorIndex)
//! in this crate and the SQLite store in the app crate. Both score with
//! [`rank_by_similarity`].

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RetrievalError;
use crate::models::{Chunk, ScoredResult};
use crate::scope::ScopePredicate;

/// Dense-vector nearest-neighbor index over chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store one embedding per chunk. Re-adding a `chunk_id` replaces it.
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Top-`top_k` chunks by similarity among those matching `predicate`.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        predicate: &ScopePredicate,
    ) -> Result<Vec<ScoredResult>>;

    /// Number of stored vectors.
    async fn count(&self) -> Result<usize>;

    /// Drop every stored vector.
    async fn clear(&self) -> Result<()>;

    /// Out-of-band correction of the metadata copy held by the index.
    ///
    /// Returns `false` if the chunk is not stored.
    async fn correct_metadata(
        &self,
        chunk_id: u64,
        source_file: Option<&str>,
        page_number: Option<u32>,
    ) -> Result<bool>;
}

/// Verify the one-embedding-per-chunk contract and a uniform dimension.
pub fn check_batch(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), RetrievalError> {
    if chunks.len() != embeddings.len() {
        return Err(RetrievalError::Embedding(format!(
            "got {} embeddings for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }
    if let Some(first) = embeddings.first() {
        if let Some(bad) = embeddings.iter().position(|e| e.len() != first.len()) {
            return Err(RetrievalError::Embedding(format!(
                "embedding {} has {} dims, expected {}",
                bad,
                embeddings[bad].len(),
                first.len()
            )));
        }
    }
    Ok(())
}

/// Score already-filtered candidates against `query` and keep the best
/// `top_k`, ordered by similarity descending then `chunk_id` ascending.
pub fn rank_by_similarity<'a, I>(query: &[f32], candidates: I, top_k: usize) -> Vec<ScoredResult>
where
    I: IntoIterator<Item = (&'a Chunk, &'a [f32])>,
{
    if top_k == 0 {
        return Vec::new();
    }
    let mut results: Vec<ScoredResult> = candidates
        .into_iter()
        .map(|(chunk, vector)| ScoredResult {
            chunk: chunk.clone(),
            raw_score: cosine_similarity(query, vector) as f64,
        })
        .collect();
    results.sort_by(|a, b| {
        b.raw_score
            .total_cmp(&a.raw_score)
            .then(a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    results.truncate(top_k);
    results
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use research_rag_core::vector::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
