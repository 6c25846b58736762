//! Sentence-aware, token-bounded chunker with word overlap.
//!
//! Converts per-page text into [`Chunk`]s whose size is measured by a
//! [`TokenCounter`]. Each chunk carries its source file, page number, and a
//! globally unique `chunk_id` assigned sequentially from a caller-supplied
//! base offset, so repeated ingests never collide.
//!
//! # Algorithm
//!
//! For each page:
//!
//! 1. Collapse whitespace and split into sentence-like units.
//! 2. Accumulate units into a buffer while tracking the token count.
//! 3. When the next unit would push the buffer past `chunk_size` and the
//!    buffer is non-empty, emit the buffer as a chunk, then seed the next
//!    buffer with the trailing `chunk_overlap` **words** of the emitted one.
//! 4. Emit whatever remains at the end of the page.
//!
//! A single sentence longer than `chunk_size` is emitted whole; the budget
//! is a soft ceiling in that case. Empty or whitespace-only pages produce
//! no chunks.
//!
//! # Example
//!
//! ```rust
//! use research_rag_core::chunk::Chunker;
//! use research_rag_core::models::Page;
//!
//! let pages = vec![Page {
//!     text: "Hello world. Second sentence.".to_string(),
//!     page_number: 1,
//!     source_file: "notes.pdf".to_string(),
//! }];
//! let chunks = Chunker::new(500, 50).split(&pages, 10, None);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_id, 10);
//! ```

use tracing::warn;

use crate::error::RetrievalError;
use crate::models::{Chunk, Page};
use crate::tokenize::{clean_text, split_sentences, HeuristicTokenCounter, TokenCounter};

/// Default chunk budget in tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap carried between consecutive chunks, in words.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Splits pages into overlapping chunks.
pub struct Chunker<C: TokenCounter = HeuristicTokenCounter> {
    chunk_size: usize,
    chunk_overlap: usize,
    counter: C,
}

impl Chunker<HeuristicTokenCounter> {
    /// Create a chunker using the fixed-ratio token estimate.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::with_counter(chunk_size, chunk_overlap, HeuristicTokenCounter)
    }
}

impl Default for Chunker<HeuristicTokenCounter> {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl<C: TokenCounter> Chunker<C> {
    pub fn with_counter(chunk_size: usize, chunk_overlap: usize, counter: C) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            counter,
        }
    }

    /// Split a batch of pages into chunks.
    ///
    /// `base_id` is the first `chunk_id` handed out; ids are contiguous
    /// across the whole batch. Malformed pages (page number 0 or no source
    /// file) are logged and skipped without consuming an id.
    pub fn split(&self, pages: &[Page], base_id: u64, session_id: Option<&str>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut next_id = base_id;

        for page in pages {
            if let Err(e) = validate_page(page) {
                warn!(error = %e, "skipping malformed page");
                continue;
            }

            for (text, token_count) in self.split_text(&page.text) {
                chunks.push(Chunk {
                    text,
                    token_count,
                    source_file: page.source_file.clone(),
                    page_number: page.page_number,
                    chunk_id: next_id,
                    session_id: session_id.map(str::to_string),
                });
                next_id += 1;
            }
        }

        chunks
    }

    /// Split one page's raw text into `(text, token_count)` pairs.
    pub fn split_text(&self, text: &str) -> Vec<(String, usize)> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut buf = String::new();
        let mut buf_tokens = 0usize;

        for sentence in split_sentences(&cleaned) {
            let sentence_tokens = self.counter.count(sentence);

            if buf_tokens + sentence_tokens > self.chunk_size && !buf.is_empty() {
                let overlap = self.overlap_words(&buf);
                out.push(self.finish(std::mem::take(&mut buf)));

                if !overlap.is_empty() {
                    buf.push_str(&overlap);
                    buf.push(' ');
                }
                buf.push_str(sentence);
                buf_tokens = self.counter.count(&buf);
            } else {
                if !buf.is_empty() {
                    buf.push(' ');
                }
                buf.push_str(sentence);
                buf_tokens += sentence_tokens;
            }
        }

        if !buf.trim().is_empty() {
            out.push(self.finish(buf));
        }

        out
    }

    /// The trailing `chunk_overlap` words of `text` (all of them if fewer).
    fn overlap_words(&self, text: &str) -> String {
        if self.chunk_overlap == 0 {
            return String::new();
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let start = words.len().saturating_sub(self.chunk_overlap);
        words[start..].join(" ")
    }

    fn finish(&self, text: String) -> (String, usize) {
        let text = text.trim().to_string();
        let tokens = self.counter.count(&text);
        (text, tokens)
    }
}

fn validate_page(page: &Page) -> Result<(), RetrievalError> {
    if page.page_number == 0 {
        return Err(RetrievalError::Ingest {
            source_file: page.source_file.clone(),
            reason: "page numbers are 1-based".to_string(),
        });
    }
    if page.source_file.trim().is_empty() {
        return Err(RetrievalError::Ingest {
            source_file: String::new(),
            reason: "page has no source file".to_string(),
        });
    }
    Ok(())
}
