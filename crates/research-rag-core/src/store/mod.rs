//! Persistence contracts for the retrieval indices.
//!
//! The lexical index is rebuilt in memory from a persisted snapshot of its
//! tokenized corpus; [`LexicalStorage`] is the durable home of that
//! snapshot. The vector side persists through its own
//! [`VectorIndex`](crate::vector::VectorIndex) implementation.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::lexical::LexicalRecord;

/// Durable save/load of a lexical index snapshot, keyed by index id.
///
/// `save` replaces the whole snapshot atomically. `load` must return the
/// records exactly as saved, in the same order, so that a reloaded index
/// scores bit-identically. `Ok(None)` means the index was never saved.
#[async_trait]
pub trait LexicalStorage: Send + Sync {
    async fn save(&self, index_id: &str, records: &[LexicalRecord]) -> Result<()>;

    async fn load(&self, index_id: &str) -> Result<Option<Vec<LexicalRecord>>>;
}
