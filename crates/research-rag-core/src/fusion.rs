//! Weighted score fusion of the lexical and vector result lists.
//!
//! The fusion engine is stateless: it sees only the two ranked lists.
//!
//! # Algorithm
//!
//! 1. Min-max normalize each list independently to `[0, 1]`. A list with a
//!    single distinct score (one element, or all equal) normalizes to `1.0`.
//! 2. Join the lists by `chunk_id`, keeping the first occurrence per side.
//!    A chunk missing from one list scores `0.0` on that side. A chunk
//!    whose raw score is not positive on any side it appears in is a
//!    neighbor with no match at all and is dropped.
//! 3. `combined = w_lex × lexical + w_vec × vector`. Weights are used as
//!    given; they need not sum to 1.
//! 4. Sort by `combined` descending, then `chunk_id` ascending, and keep
//!    the first `top_k`.
//!
//! Callers should over-fetch from each index (e.g. `2 × top_k`) so that a
//! chunk ranked just outside one side's top-k can still surface after the
//! join.

use std::collections::BTreeMap;

use crate::models::{Chunk, FusedResult, ScoredResult};

/// Per-side weights for [`fuse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f64,
    pub vector: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.5,
            vector: 0.5,
        }
    }
}

/// Min-max normalize raw scores to `[0.0, 1.0]`, preserving order.
///
/// If every score is equal (including a single score), all normalize to
/// `1.0`.
pub fn normalize_scores(results: &[ScoredResult]) -> Vec<f64> {
    if results.is_empty() {
        return Vec::new();
    }

    let s_min = results
        .iter()
        .map(|r| r.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = results
        .iter()
        .map(|r| r.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    results
        .iter()
        .map(|r| {
            if s_max > s_min {
                (r.raw_score - s_min) / (s_max - s_min)
            } else {
                1.0
            }
        })
        .collect()
}

struct Joined {
    chunk: Chunk,
    lexical: Option<(f64, f64)>,
    vector: Option<(f64, f64)>,
}

impl Joined {
    fn new(chunk: &Chunk) -> Self {
        Self {
            chunk: chunk.clone(),
            lexical: None,
            vector: None,
        }
    }

    fn matched(&self) -> bool {
        [self.lexical, self.vector]
            .iter()
            .flatten()
            .any(|(raw, _)| *raw > 0.0)
    }
}

/// Fuse two independently ranked lists into one.
pub fn fuse(
    lexical: &[ScoredResult],
    vector: &[ScoredResult],
    weights: FusionWeights,
    top_k: usize,
) -> Vec<FusedResult> {
    let norm_lexical = normalize_scores(lexical);
    let norm_vector = normalize_scores(vector);

    let mut joined: BTreeMap<u64, Joined> = BTreeMap::new();

    for (r, score) in lexical.iter().zip(norm_lexical) {
        let j = joined
            .entry(r.chunk.chunk_id)
            .or_insert_with(|| Joined::new(&r.chunk));
        if j.lexical.is_none() {
            j.lexical = Some((r.raw_score, score));
        }
    }
    for (r, score) in vector.iter().zip(norm_vector) {
        let j = joined
            .entry(r.chunk.chunk_id)
            .or_insert_with(|| Joined::new(&r.chunk));
        if j.vector.is_none() {
            j.vector = Some((r.raw_score, score));
        }
    }

    let mut fused: Vec<FusedResult> = joined
        .into_values()
        .filter(Joined::matched)
        .map(|j| {
            let lexical = j.lexical.map_or(0.0, |(_, s)| s);
            let vector = j.vector.map_or(0.0, |(_, s)| s);
            FusedResult {
                combined_score: weights.lexical * lexical + weights.vector * vector,
                lexical_score: lexical,
                vector_score: vector,
                chunk: j.chunk,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then(a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    fused.truncate(top_k);
    fused
}
