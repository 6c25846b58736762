//! Hybrid retriever: owns the lexical index and drives both sides.
//!
//! The retriever ties the pieces together:
//!
//! - ingest: chunks go to the lexical index (then its snapshot is
//!   persisted) and, when a vector side is configured, are embedded and
//!   added to the vector index;
//! - query: one [`ScopePredicate`] is passed to both indices, each side is
//!   over-fetched, and the two lists are [`fuse`]d.
//!
//! Query-time failures are isolated per index. If the embedder or the
//! vector index fails, the query degrades to lexical-only ranking and the
//! failure is logged; it never surfaces as an error.
//!
//! Mutations are serialized by an async writer lock held across the whole
//! sequence. Each one stages a copy of the lexical index, persists it, and
//! only then swaps it in and touches the vector side, so a failed save
//! leaves both indices unchanged. Queries read the `RwLock`ed index and
//! never wait on the writer.

use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::embedding::{embed_one, EmbeddingProvider};
use crate::error::RetrievalError;
use crate::fusion::{fuse, FusionWeights};
use crate::lexical::LexicalIndex;
use crate::models::{Chunk, FusedResult, ScoredResult};
use crate::scope::ScopePredicate;
use crate::store::LexicalStorage;
use crate::vector::VectorIndex;

/// Default lexical snapshot name.
pub const DEFAULT_INDEX_ID: &str = "main";

/// Per-query retrieval knobs.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub top_k: usize,
    pub weights: FusionWeights,
    /// Each index is asked for `overfetch × top_k` candidates.
    pub overfetch: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            weights: FusionWeights::default(),
            overfetch: 2,
        }
    }
}

impl SearchOptions {
    fn candidate_k(&self) -> usize {
        self.top_k.saturating_mul(self.overfetch.max(1))
    }
}

/// Outcome of [`HybridRetriever::add_documents`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub lexical_added: usize,
    pub vectors_added: usize,
}

/// Index sizes reported by [`HybridRetriever::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrieverStats {
    pub lexical_chunks: usize,
    /// `None` when no vector side is configured.
    pub vector_chunks: Option<usize>,
    pub embedding_model: Option<String>,
}

struct VectorSide {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

/// Lexical + vector retrieval over one corpus.
pub struct HybridRetriever {
    lexical: RwLock<LexicalIndex>,
    storage: Arc<dyn LexicalStorage>,
    index_id: String,
    vector: Option<VectorSide>,
    writer: Mutex<()>,
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("lexical index lock poisoned")
}

impl HybridRetriever {
    /// Load the persisted lexical snapshot `index_id` from `storage`.
    ///
    /// A missing snapshot yields an empty index. An unreadable one is
    /// logged and also yields an empty index, so a corrupt store never
    /// stops the process; the next save overwrites it.
    pub async fn open(storage: Arc<dyn LexicalStorage>, index_id: &str) -> Self {
        let lexical = match storage.load(index_id).await {
            Ok(Some(records)) => {
                let index = LexicalIndex::from_records(records);
                debug!(index_id, chunks = index.len(), "loaded lexical snapshot");
                index
            }
            Ok(None) => LexicalIndex::new(),
            Err(e) => {
                let err = RetrievalError::IndexUnavailable {
                    index: index_id.to_string(),
                    reason: format!("{:#}", e),
                };
                warn!(error = %err, "starting with an empty lexical index");
                LexicalIndex::new()
            }
        };

        Self {
            lexical: RwLock::new(lexical),
            storage,
            index_id: index_id.to_string(),
            vector: None,
            writer: Mutex::new(()),
        }
    }

    /// Enable the vector side. Without it, retrieval is lexical-only.
    pub fn with_vectors(
        mut self,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.vector = Some(VectorSide { index, embedder });
        self
    }

    pub fn has_vectors(&self) -> bool {
        self.vector.is_some()
    }

    /// Index new chunks on both sides.
    ///
    /// The lexical snapshot is persisted first; if that fails the error is
    /// returned and neither index changes. Embedding or vector-store
    /// failures after that are logged and leave the batch lexical-only
    /// (`vectors_added == 0`).
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn add_documents(&self, chunks: &[Chunk]) -> Result<IngestReport> {
        if chunks.is_empty() {
            return Ok(IngestReport::default());
        }
        let _writer = self.writer.lock().await;

        let mut staged = self.staged()?;
        staged.add(chunks);
        self.commit(staged).await?;

        let vectors_added = match &self.vector {
            Some(side) => add_vectors(side, chunks).await,
            None => 0,
        };

        info!(
            lexical = chunks.len(),
            vectors = vectors_added,
            "indexed chunks"
        );
        Ok(IngestReport {
            lexical_added: chunks.len(),
            vectors_added,
        })
    }

    /// Replace the content of both indices with `chunks`.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn build_indices(&self, chunks: &[Chunk]) -> Result<IngestReport> {
        let _writer = self.writer.lock().await;

        let mut staged = self.staged()?;
        staged.build(chunks);
        self.commit(staged).await?;

        let vectors_added = match &self.vector {
            Some(side) => {
                side.index.clear().await.context("clearing vector index")?;
                add_vectors(side, chunks).await
            }
            None => 0,
        };

        info!(chunks = chunks.len(), vectors = vectors_added, "rebuilt indices");
        Ok(IngestReport {
            lexical_added: chunks.len(),
            vectors_added,
        })
    }

    /// Query both indices under `predicate` and fuse the results.
    ///
    /// Never fails: a side that errors contributes an empty list.
    #[instrument(skip(self, predicate), fields(top_k = options.top_k))]
    pub async fn hybrid_search(
        &self,
        query: &str,
        options: &SearchOptions,
        predicate: &ScopePredicate,
    ) -> Vec<FusedResult> {
        if options.top_k == 0 || predicate.is_empty_universe() {
            debug!("empty scope or top_k, skipping index queries");
            return Vec::new();
        }
        let candidate_k = options.candidate_k();

        // Embedding happens here, before the lexical lock is taken.
        let vector_results = match &self.vector {
            Some(side) => match query_vectors(side, query, candidate_k, predicate).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(error = %e, "vector side failed, using lexical results only");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let lexical_results = match self.lexical.read() {
            Ok(lexical) => lexical.query(query, candidate_k, predicate),
            Err(e) => {
                let err = RetrievalError::query("lexical", e);
                warn!(error = %err, "lexical side failed, using vector results only");
                Vec::new()
            }
        };

        let fused = fuse(
            &lexical_results,
            &vector_results,
            options.weights,
            options.top_k,
        );
        debug!(
            lexical = lexical_results.len(),
            vector = vector_results.len(),
            fused = fused.len(),
            "hybrid search complete"
        );
        fused
    }

    pub async fn stats(&self) -> Result<RetrieverStats> {
        let lexical_chunks = self.lexical.read().map_err(poisoned)?.len();
        let (vector_chunks, embedding_model) = match &self.vector {
            Some(side) => (
                Some(side.index.count().await.context("counting vectors")?),
                Some(side.embedder.model_name().to_string()),
            ),
            None => (None, None),
        };
        Ok(RetrieverStats {
            lexical_chunks,
            vector_chunks,
            embedding_model,
        })
    }

    /// Empty both indices and persist the empty lexical snapshot.
    pub async fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().await;

        let mut staged = self.staged()?;
        staged.clear();
        self.commit(staged).await?;

        if let Some(side) = &self.vector {
            side.index.clear().await.context("clearing vector index")?;
        }
        info!(index_id = %self.index_id, "cleared indices");
        Ok(())
    }

    /// Correct a chunk's source/page in both indices.
    ///
    /// Returns `true` if either index held the chunk.
    pub async fn correct_metadata(
        &self,
        chunk_id: u64,
        source_file: Option<&str>,
        page_number: Option<u32>,
    ) -> Result<bool> {
        let _writer = self.writer.lock().await;

        let mut staged = self.staged()?;
        let in_lexical = staged.correct_metadata(chunk_id, source_file, page_number);
        if in_lexical {
            self.commit(staged).await?;
        }

        let in_vector = match &self.vector {
            Some(side) => side
                .index
                .correct_metadata(chunk_id, source_file, page_number)
                .await
                .context("correcting vector metadata")?,
            None => false,
        };
        Ok(in_lexical || in_vector)
    }

    /// Chunks of one page, in chunk id order.
    pub fn chunks_for_page(&self, source_file: &str, page_number: u32) -> Result<Vec<Chunk>> {
        let lexical = self.lexical.read().map_err(poisoned)?;
        Ok(lexical.chunks_for_page(source_file, page_number))
    }

    pub fn get(&self, chunk_id: u64) -> Result<Option<Chunk>> {
        let lexical = self.lexical.read().map_err(poisoned)?;
        Ok(lexical.get(chunk_id).cloned())
    }

    /// Copy of the live lexical index for a writer to modify.
    fn staged(&self) -> Result<LexicalIndex> {
        Ok(self.lexical.read().map_err(poisoned)?.clone())
    }

    /// Persist `staged`, then make it the live index.
    ///
    /// Callers hold the writer lock.
    async fn commit(&self, staged: LexicalIndex) -> Result<()> {
        self.storage
            .save(&self.index_id, &staged.records())
            .await
            .map_err(|e| RetrievalError::Storage(format!("{:#}", e)))
            .with_context(|| format!("saving lexical snapshot '{}'", self.index_id))?;
        *self.lexical.write().map_err(poisoned)? = staged;
        Ok(())
    }
}

/// Embed and store `chunks`; returns the number stored (0 on failure).
async fn add_vectors(side: &VectorSide, chunks: &[Chunk]) -> usize {
    if chunks.is_empty() {
        return 0;
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = match side.embedder.embed(&texts).await {
        Ok(e) => e,
        Err(e) => {
            let err = RetrievalError::Embedding(format!("{:#}", e));
            warn!(error = %err, "batch left lexical-only");
            return 0;
        }
    };
    match side.index.add(chunks, &embeddings).await {
        Ok(()) => chunks.len(),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "vector add failed, batch left lexical-only");
            0
        }
    }
}

async fn query_vectors(
    side: &VectorSide,
    query: &str,
    candidate_k: usize,
    predicate: &ScopePredicate,
) -> Result<Vec<ScoredResult>, RetrievalError> {
    let embedding = embed_one(side.embedder.as_ref(), query)
        .await
        .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))?;
    side.index
        .query(&embedding, candidate_k, predicate)
        .await
        .map_err(|e| RetrievalError::query("vector", format!("{:#}", e)))
}
