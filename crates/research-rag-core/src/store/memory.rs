//! In-memory storage backends for testing and WASM targets.
//!
//! Uses `BTreeMap`/`HashMap` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over the vectors that pass the scope
//! predicate, so filtering happens inside the search.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::lexical::LexicalRecord;
use crate::models::{Chunk, ScoredResult};
use crate::scope::ScopePredicate;
use crate::store::LexicalStorage;
use crate::vector::{check_batch, rank_by_similarity, VectorIndex};

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// Lexical snapshots held in a map; lost when dropped.
#[derive(Default)]
pub struct InMemoryLexicalStorage {
    snapshots: RwLock<HashMap<String, Vec<LexicalRecord>>>,
}

impl InMemoryLexicalStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LexicalStorage for InMemoryLexicalStorage {
    async fn save(&self, index_id: &str, records: &[LexicalRecord]) -> Result<()> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        snapshots.insert(index_id.to_string(), records.to_vec());
        Ok(())
    }

    async fn load(&self, index_id: &str) -> Result<Option<Vec<LexicalRecord>>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots.get(index_id).cloned())
    }
}

struct StoredVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force vector index keyed by `chunk_id`.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    vectors: RwLock<BTreeMap<u64, StoredVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        check_batch(chunks, embeddings)?;
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        for (chunk, vector) in chunks.iter().zip(embeddings) {
            vectors.insert(
                chunk.chunk_id,
                StoredVector {
                    chunk: chunk.clone(),
                    vector: vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        predicate: &ScopePredicate,
    ) -> Result<Vec<ScoredResult>> {
        if predicate.is_empty_universe() {
            return Ok(Vec::new());
        }
        let vectors = self.vectors.read().map_err(poisoned)?;
        let candidates = vectors
            .values()
            .filter(|sv| predicate.matches(&sv.chunk))
            .map(|sv| (&sv.chunk, sv.vector.as_slice()));
        Ok(rank_by_similarity(embedding, candidates, top_k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.vectors.read().map_err(poisoned)?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.vectors.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn correct_metadata(
        &self,
        chunk_id: u64,
        source_file: Option<&str>,
        page_number: Option<u32>,
    ) -> Result<bool> {
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        let Some(sv) = vectors.get_mut(&chunk_id) else {
            return Ok(false);
        };
        if let Some(src) = source_file {
            sv.chunk.source_file = src.to_string();
        }
        if let Some(page) = page_number {
            sv.chunk.page_number = page;
        }
        Ok(true)
    }
}
