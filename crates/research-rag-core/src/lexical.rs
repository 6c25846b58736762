//! Okapi BM25 lexical index over chunk text.
//!
//! Chunks are tokenized with [`lexical_tokens`] (case-folded whitespace
//! split) at ingest and at query time. Every write recomputes the corpus
//! statistics (average document length and IDF table); the index is a
//! rebuild-on-write structure meant for batch ingest.
//!
//! # Scoring
//!
//! ```text
//! idf(t)      = ln(1 + (N - n(t) + 0.5) / (n(t) + 0.5))
//! score(d, q) = Σ_{t ∈ q} idf(t) · tf(t,d)·(k1+1) / (tf(t,d) + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! Query results are filtered by the [`ScopePredicate`] **before** top-k
//! truncation, keep only strictly positive scores, and are ordered by score
//! descending then `chunk_id` ascending.
//!
//! All statistics live in ordered maps and entries are scored in insertion
//! order, so identical corpora (including one reloaded from storage)
//! produce bit-identical scores.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Chunk, ScoredResult};
use crate::scope::ScopePredicate;
use crate::tokenize::lexical_tokens;

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
        }
    }
}

/// Persisted form of one indexed chunk: its token stream plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalRecord {
    pub tokens: Vec<String>,
    pub chunk: Chunk,
}

#[derive(Clone)]
struct Entry {
    record: LexicalRecord,
    term_freqs: HashMap<String, u32>,
}

impl Entry {
    fn new(record: LexicalRecord) -> Self {
        let mut term_freqs = HashMap::new();
        for t in &record.tokens {
            *term_freqs.entry(t.clone()).or_insert(0) += 1;
        }
        Self { record, term_freqs }
    }

    fn len(&self) -> usize {
        self.record.tokens.len()
    }
}

/// In-memory BM25 index. Wrap in a lock for shared use.
#[derive(Clone)]
pub struct LexicalIndex {
    params: Bm25Params,
    entries: Vec<Entry>,
    idf: BTreeMap<String, f64>,
    avgdl: f64,
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::with_params(Bm25Params::default())
    }

    pub fn with_params(params: Bm25Params) -> Self {
        Self {
            params,
            entries: Vec::new(),
            idf: BTreeMap::new(),
            avgdl: 0.0,
        }
    }

    /// Restore an index from persisted records, in their stored order.
    pub fn from_records(records: Vec<LexicalRecord>) -> Self {
        let mut index = Self::new();
        index.entries = records.into_iter().map(Entry::new).collect();
        index.recompute();
        index
    }

    /// Replace the whole index content.
    pub fn build(&mut self, chunks: &[Chunk]) {
        self.entries = chunks.iter().cloned().map(to_entry).collect();
        self.recompute();
    }

    /// Append chunks and recompute corpus statistics.
    ///
    /// A chunk whose `chunk_id` is already indexed replaces the old entry.
    pub fn add(&mut self, chunks: &[Chunk]) {
        if chunks.is_empty() {
            return;
        }
        let incoming: HashSet<u64> = chunks.iter().map(|c| c.chunk_id).collect();
        self.entries
            .retain(|e| !incoming.contains(&e.record.chunk.chunk_id));
        self.entries.extend(chunks.iter().cloned().map(to_entry));
        self.recompute();
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recompute();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the indexed corpus for persistence.
    pub fn records(&self) -> Vec<LexicalRecord> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    /// Look up an indexed chunk by id.
    pub fn get(&self, chunk_id: u64) -> Option<&Chunk> {
        self.entries
            .iter()
            .map(|e| &e.record.chunk)
            .find(|c| c.chunk_id == chunk_id)
    }

    /// All indexed chunks from one page of one file, in chunk id order.
    pub fn chunks_for_page(&self, source_file: &str, page_number: u32) -> Vec<Chunk> {
        let mut out: Vec<Chunk> = self
            .entries
            .iter()
            .map(|e| &e.record.chunk)
            .filter(|c| c.source_file == source_file && c.page_number == page_number)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_id);
        out
    }

    /// Out-of-band metadata correction. Scores are unaffected.
    ///
    /// Returns `false` if the chunk is not indexed.
    pub fn correct_metadata(
        &mut self,
        chunk_id: u64,
        source_file: Option<&str>,
        page_number: Option<u32>,
    ) -> bool {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.record.chunk.chunk_id == chunk_id)
        else {
            return false;
        };
        if let Some(src) = source_file {
            entry.record.chunk.source_file = src.to_string();
        }
        if let Some(page) = page_number {
            entry.record.chunk.page_number = page;
        }
        true
    }

    /// Rank chunks matching `predicate` against `query`.
    pub fn query(&self, query: &str, top_k: usize, predicate: &ScopePredicate) -> Vec<ScoredResult> {
        if top_k == 0 || self.entries.is_empty() || predicate.is_empty_universe() {
            return Vec::new();
        }
        let terms = lexical_tokens(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<ScoredResult> = self
            .entries
            .iter()
            .filter(|e| predicate.matches(&e.record.chunk))
            .filter_map(|e| {
                let score = self.score(e, &terms);
                (score > 0.0).then(|| ScoredResult {
                    chunk: e.record.chunk.clone(),
                    raw_score: score,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.raw_score
                .total_cmp(&a.raw_score)
                .then(a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        results.truncate(top_k);

        debug!(hits = results.len(), "lexical query");
        results
    }

    fn score(&self, entry: &Entry, terms: &[String]) -> f64 {
        let Bm25Params { k1, b } = self.params;
        let dl = entry.len() as f64;
        let norm = if self.avgdl > 0.0 {
            1.0 - b + b * dl / self.avgdl
        } else {
            1.0
        };

        terms
            .iter()
            .map(|t| {
                let tf = entry.term_freqs.get(t).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.idf.get(t).copied().unwrap_or(0.0);
                idf * (tf * (k1 + 1.0)) / (tf + k1 * norm)
            })
            .sum()
    }

    fn recompute(&mut self) {
        let n = self.entries.len();
        self.idf.clear();
        if n == 0 {
            self.avgdl = 0.0;
            return;
        }

        let total_len: usize = self.entries.iter().map(Entry::len).sum();
        self.avgdl = total_len as f64 / n as f64;

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for e in &self.entries {
            for term in e.term_freqs.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        // The +1 keeps IDF positive even for terms present in most chunks,
        // so any matching term contributes a positive score.
        let n = n as f64;
        for (term, df) in doc_freq {
            let df = df as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            self.idf.insert(term.to_string(), idf);
        }
    }
}

fn to_entry(chunk: Chunk) -> Entry {
    Entry::new(LexicalRecord {
        tokens: lexical_tokens(&chunk.text),
        chunk,
    })
}
