//! Text normalization, sentence splitting, and tokenization.
//!
//! Two distinct notions of "token" live here:
//!
//! - [`TokenCounter`] measures chunk size at ingest. The default
//!   [`HeuristicTokenCounter`] uses a fixed chars-per-token ratio; the app
//!   crate can plug in a real subword tokenizer.
//! - [`lexical_tokens`] produces the terms the lexical index scores. It
//!   must be applied identically at ingest and at query time.

/// Approximate characters-per-token ratio for BPE-style tokenizers.
const CHARS_PER_TOKEN: usize = 4;

/// Counts tokens for chunk sizing. Implementations must be deterministic.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Fixed-ratio token estimate: `ceil(chars / 4)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(CHARS_PER_TOKEN)
    }
}

/// Case-folded whitespace tokenization used by the lexical index.
pub fn lexical_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// Collapse every whitespace run to a single space and trim the ends.
///
/// PDF extraction leaves hard line breaks and runs of spaces in the middle
/// of sentences; cleaning first makes sentence splitting and word-level
/// overlap independent of the page layout.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split cleaned text into sentence-like units.
///
/// A unit ends after `.`, `!` or `?` when the next character is whitespace
/// (or the end of input). Joining the returned units with a single space
/// reproduces `text` exactly when `text` came from [`clean_text`].
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let boundary = match chars.peek() {
            None => true,
            Some((_, next)) => next.is_whitespace(),
        };
        if boundary {
            let end = i + c.len_utf8();
            let piece = text[start..end].trim();
            if !piece.is_empty() {
                sentences.push(piece);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}
