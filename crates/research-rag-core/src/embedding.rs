//! Embedding provider trait.
//!
//! Concrete backends (OpenAI, Ollama, fastembed) live in the `research-rag`
//! app crate. The retriever only needs this interface: a model identity,
//! a dimensionality, and batch embedding.

use anyhow::{bail, Result};
use async_trait::async_trait;

/// Interface every embedding backend implements.
///
/// The same provider must be used at ingest and at query time; vectors
/// from different models are not comparable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let mut vectors = provider.embed(&[text.to_string()]).await?;
    if vectors.len() != 1 {
        bail!(
            "{} returned {} vectors for one input",
            provider.model_name(),
            vectors.len()
        );
    }
    Ok(vectors.remove(0))
}
