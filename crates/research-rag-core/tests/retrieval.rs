//! End-to-end retrieval tests over the in-memory backends.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use research_rag_core::chunk::Chunker;
use research_rag_core::embedding::EmbeddingProvider;
use research_rag_core::fusion::FusionWeights;
use research_rag_core::models::{Chunk, Page, ScoredResult};
use research_rag_core::retriever::{HybridRetriever, SearchOptions, DEFAULT_INDEX_ID};
use research_rag_core::scope::{resolve, ScopeKind, ScopePredicate};
use research_rag_core::store::memory::{InMemoryLexicalStorage, InMemoryVectorIndex};
use research_rag_core::store::LexicalStorage;
use research_rag_core::vector::VectorIndex;

/// Bag-of-concepts embedder: each known word adds 1 to its concept's axis.
struct ConceptEmbedder;

fn concept(word: &str) -> Option<usize> {
    match word {
        "machine" | "learning" | "neural" => Some(0),
        "algorithms" | "methods" | "techniques" => Some(1),
        "recipe" | "tomato" | "soup" | "pasta" => Some(2),
        "rust" | "borrow" | "ownership" => Some(3),
        _ => None,
    }
}

#[async_trait]
impl EmbeddingProvider for ConceptEmbedder {
    fn model_name(&self) -> &str {
        "concepts"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 4];
                for word in t.to_lowercase().split_whitespace() {
                    if let Some(axis) = concept(word) {
                        v[axis] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "down"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("connection refused")
    }
}

struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn add(&self, _chunks: &[Chunk], _embeddings: &[Vec<f32>]) -> Result<()> {
        bail!("collection missing")
    }
    async fn query(&self, _: &[f32], _: usize, _: &ScopePredicate) -> Result<Vec<ScoredResult>> {
        bail!("collection missing")
    }
    async fn count(&self) -> Result<usize> {
        Ok(0)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn correct_metadata(&self, _: u64, _: Option<&str>, _: Option<u32>) -> Result<bool> {
        Ok(false)
    }
}

fn chunk(id: u64, text: &str, source: &str, session: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        token_count: text.split_whitespace().count(),
        source_file: source.to_string(),
        page_number: 1,
        chunk_id: id,
        session_id: Some(session.to_string()),
    }
}

/// A mentions "machine learning" three times, B once but is the semantic
/// match for the query, C is unrelated.
fn scenario_corpus() -> Vec<Chunk> {
    vec![
        chunk(
            0,
            "machine learning machine learning machine learning",
            "a.pdf",
            "s1",
        ),
        chunk(1, "an overview of machine learning methods", "b.pdf", "s1"),
        chunk(2, "a recipe for tomato soup", "c.pdf", "s1"),
    ]
}

async fn hybrid() -> HybridRetriever {
    HybridRetriever::open(Arc::new(InMemoryLexicalStorage::new()), DEFAULT_INDEX_ID)
        .await
        .with_vectors(Arc::new(InMemoryVectorIndex::new()), Arc::new(ConceptEmbedder))
}

fn options(top_k: usize) -> SearchOptions {
    SearchOptions {
        top_k,
        weights: FusionWeights {
            lexical: 0.5,
            vector: 0.5,
        },
        overfetch: 2,
    }
}

fn ids(results: &[research_rag_core::models::FusedResult]) -> Vec<u64> {
    results.iter().map(|r| r.chunk.chunk_id).collect()
}

#[tokio::test]
async fn test_lexical_and_semantic_leaders_both_surface() {
    let r = hybrid().await;
    r.add_documents(&scenario_corpus()).await.unwrap();

    let results = r
        .hybrid_search(
            "machine learning algorithms",
            &options(2),
            &ScopePredicate::unrestricted(),
        )
        .await;

    assert_eq!(ids(&results), vec![0, 1]);
    assert_eq!(results[0].lexical_score, 1.0);
    assert_eq!(results[1].vector_score, 1.0);
    assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.lexical_score)));
    assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.vector_score)));
}

#[tokio::test]
async fn test_selected_scope_excludes_better_chunks() {
    let r = hybrid().await;
    r.add_documents(&scenario_corpus()).await.unwrap();

    let selected = vec!["c.pdf".to_string()];
    let predicate = resolve(ScopeKind::Selected, None, Some(&selected));
    let results = r
        .hybrid_search("machine learning algorithms", &options(2), &predicate)
        .await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_session_scope_without_id_fails_closed() {
    let r = hybrid().await;
    r.add_documents(&scenario_corpus()).await.unwrap();

    let predicate = resolve(ScopeKind::Session, None, None);
    let results = r
        .hybrid_search("machine learning", &options(5), &predicate)
        .await;
    assert!(results.is_empty());

    let predicate = resolve(ScopeKind::Session, Some("s1"), None);
    let results = r
        .hybrid_search("machine learning", &options(5), &predicate)
        .await;
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_session_scope_isolates_upload_batches() {
    let r = hybrid().await;
    r.add_documents(&[
        chunk(0, "rust ownership rules", "old.txt", "s1"),
        chunk(1, "rust borrow checker", "new.txt", "s2"),
    ])
    .await
    .unwrap();

    let predicate = resolve(ScopeKind::Session, Some("s2"), None);
    let results = r.hybrid_search("rust", &options(5), &predicate).await;
    assert_eq!(ids(&results), vec![1]);
}

#[tokio::test]
async fn test_repeated_query_is_identical() {
    let r = hybrid().await;
    let mut corpus = scenario_corpus();
    // Exact duplicates force ties on both sides.
    corpus.push(chunk(3, "an overview of machine learning methods", "d.pdf", "s1"));
    corpus.push(chunk(4, "an overview of machine learning methods", "e.pdf", "s1"));
    r.add_documents(&corpus).await.unwrap();

    let first = r
        .hybrid_search("machine learning methods", &options(4), &ScopePredicate::unrestricted())
        .await;
    for _ in 0..10 {
        let again = r
            .hybrid_search("machine learning methods", &options(4), &ScopePredicate::unrestricted())
            .await;
        assert_eq!(again, first);
    }
    let tied: Vec<u64> = first
        .iter()
        .filter(|f| f.chunk.text.starts_with("an overview"))
        .map(|f| f.chunk.chunk_id)
        .collect();
    assert_eq!(tied, vec![1, 3, 4]);
}

#[tokio::test]
async fn test_failing_vector_index_degrades_to_lexical() {
    let r = HybridRetriever::open(Arc::new(InMemoryLexicalStorage::new()), DEFAULT_INDEX_ID)
        .await
        .with_vectors(Arc::new(FailingIndex), Arc::new(ConceptEmbedder));
    let report = r.add_documents(&scenario_corpus()).await.unwrap();
    assert_eq!(report.lexical_added, 3);
    assert_eq!(report.vectors_added, 0);

    let results = r
        .hybrid_search("machine learning", &options(2), &ScopePredicate::unrestricted())
        .await;
    assert_eq!(ids(&results), vec![0, 1]);
    assert!(results.iter().all(|f| f.vector_score == 0.0));
}

#[tokio::test]
async fn test_failing_embedder_degrades_to_lexical() {
    let r = HybridRetriever::open(Arc::new(InMemoryLexicalStorage::new()), DEFAULT_INDEX_ID)
        .await
        .with_vectors(Arc::new(InMemoryVectorIndex::new()), Arc::new(FailingEmbedder));
    r.add_documents(&scenario_corpus()).await.unwrap();

    let results = r
        .hybrid_search("tomato", &options(2), &ScopePredicate::unrestricted())
        .await;
    assert_eq!(ids(&results), vec![2]);
}

#[tokio::test]
async fn test_reload_reproduces_lexical_scores() {
    let storage: Arc<dyn LexicalStorage> = Arc::new(InMemoryLexicalStorage::new());
    let before = {
        let r = HybridRetriever::open(storage.clone(), DEFAULT_INDEX_ID).await;
        r.add_documents(&scenario_corpus()).await.unwrap();
        r.add_documents(&[chunk(3, "neural machine translation", "d.pdf", "s2")])
            .await
            .unwrap();
        r.hybrid_search("machine learning", &options(5), &ScopePredicate::unrestricted())
            .await
    };

    let reopened = HybridRetriever::open(storage, DEFAULT_INDEX_ID).await;
    let after = reopened
        .hybrid_search("machine learning", &options(5), &ScopePredicate::unrestricted())
        .await;
    assert_eq!(before, after);
    assert_eq!(after.len(), 3);
}

#[tokio::test]
async fn test_chunked_pages_flow_through_retriever() {
    let pages = vec![
        Page {
            text: "Rust has ownership. The borrow checker enforces it.".to_string(),
            page_number: 1,
            source_file: "rust.txt".to_string(),
        },
        Page {
            text: "   ".to_string(),
            page_number: 2,
            source_file: "rust.txt".to_string(),
        },
        Page {
            text: "Tomato soup needs a good recipe.".to_string(),
            page_number: 3,
            source_file: "rust.txt".to_string(),
        },
    ];
    let chunks = Chunker::default().split(&pages, 100, Some("batch-1"));
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chunk_id, 100);
    assert_eq!(chunks[1].page_number, 3);

    let r = hybrid().await;
    r.add_documents(&chunks).await.unwrap();
    let predicate = resolve(ScopeKind::Session, Some("batch-1"), None);
    let results = r.hybrid_search("borrow", &options(5), &predicate).await;
    assert_eq!(results[0].chunk.chunk_id, 100);
    assert_eq!(r.chunks_for_page("rust.txt", 3).unwrap().len(), 1);
}
