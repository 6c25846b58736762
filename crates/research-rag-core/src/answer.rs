//! Answer generation contract, prompt assembly, and citation preparation.
//!
//! The language-model call itself is an external collaborator behind
//! [`AnswerGenerator`]. This module owns everything around it: turning the
//! fused top-k into numbered context blocks, the prompt text, the fixed
//! fallback messages, and the deduplicated citation list.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::models::{Chunk, FusedResult, SourceCitation};
use crate::scope::ScopeKind;

/// Returned when the model produced no usable text.
pub const EMPTY_ANSWER_FALLBACK: &str =
    "I couldn't generate a response. Please try rephrasing your question.";

/// Maximum characters of chunk text kept in a citation excerpt.
pub const EXCERPT_CHARS: usize = 200;

/// Chunks fed to a document summary.
pub const SUMMARY_CHUNK_LIMIT: usize = 10;

/// A text-in, text-out language model.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete `prompt`. An `Ok` empty string means the model declined
    /// or was filtered; callers substitute [`EMPTY_ANSWER_FALLBACK`].
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// A generated answer with its supporting citations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    /// Number of chunks placed in the prompt.
    pub context_used: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Message returned, without calling the model, when retrieval is empty.
pub fn no_results_message(scope: ScopeKind) -> String {
    let suffix = match scope {
        ScopeKind::Session => " in the current session",
        ScopeKind::Selected => " in the selected documents",
        ScopeKind::All => "",
    };
    format!(
        "I couldn't find any relevant information{} to answer your question.",
        suffix
    )
}

/// Numbered context blocks, one per retrieved chunk, in rank order.
pub fn build_context(results: &[FusedResult]) -> String {
    if results.is_empty() {
        return "No relevant context found.".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "Context {} (Source: {}, Page: {}):\n{}\n",
                i + 1,
                r.chunk.source_file,
                r.chunk.page_number,
                r.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful AI assistant that answers questions based on provided context from documents.

CONTEXT:
{context}

QUESTION: {question}

INSTRUCTIONS:
1. Answer the question based ONLY on the provided context
2. If the context doesn't contain enough information to answer the question, say so clearly
3. Be specific and cite which source document and page number your answer comes from
4. Provide a clear, well-structured answer
5. If multiple sources support your answer, mention all relevant sources

ANSWER:"
    )
}

/// Prompt for summarizing a document from its first chunks.
pub fn build_summary_prompt(chunks: &[Chunk]) -> String {
    let content = chunks
        .iter()
        .take(SUMMARY_CHUNK_LIMIT)
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Please provide a concise summary of the following document content:

CONTENT:
{content}

INSTRUCTIONS:
1. Provide a clear, structured summary
2. Highlight the main topics and key points
3. Keep the summary concise but informative
4. Use bullet points if appropriate

SUMMARY:"
    )
}

/// Citation excerpt: the first [`EXCERPT_CHARS`] characters, with `...`
/// appended when the text was cut.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One citation per `(source_file, page_number)`, keeping the chunk with
/// the highest `combined_score` for that page, sorted by score descending.
///
/// Ties keep the earlier-ranked chunk and sort by file then page.
pub fn prepare_sources(results: &[FusedResult]) -> Vec<SourceCitation> {
    let mut best: BTreeMap<(&str, u32), &FusedResult> = BTreeMap::new();
    for r in results {
        let key = (r.chunk.source_file.as_str(), r.chunk.page_number);
        best.entry(key)
            .and_modify(|current| {
                if r.combined_score > current.combined_score {
                    *current = r;
                }
            })
            .or_insert(r);
    }

    let mut sources: Vec<SourceCitation> = best
        .into_values()
        .map(|r| SourceCitation {
            source_file: r.chunk.source_file.clone(),
            page_number: r.chunk.page_number,
            chunk_text: excerpt(&r.chunk.text),
            relevance_score: r.combined_score,
        })
        .collect();
    sources.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    sources
}

/// Answer `question` from the fused retrieval results.
///
/// With no results the model is not called and the scope-specific
/// "nothing found" message is returned. A model failure is reported in
/// the returned [`Answer`] rather than as an error.
pub async fn answer_question(
    generator: &dyn AnswerGenerator,
    question: &str,
    results: &[FusedResult],
    scope: ScopeKind,
) -> Answer {
    if results.is_empty() {
        return Answer {
            answer: no_results_message(scope),
            sources: Vec::new(),
            context_used: 0,
            success: true,
            error: None,
        };
    }

    let prompt = build_prompt(question, &build_context(results));
    match generator.generate(&prompt).await {
        Ok(text) => {
            let text = text.trim();
            Answer {
                answer: if text.is_empty() {
                    EMPTY_ANSWER_FALLBACK.to_string()
                } else {
                    text.to_string()
                },
                sources: prepare_sources(results),
                context_used: results.len(),
                success: true,
                error: None,
            }
        }
        Err(e) => {
            warn!(model = generator.model_name(), error = %format!("{:#}", e), "answer generation failed");
            Answer {
                answer: format!(
                    "I apologize, but I encountered an error while processing your question: {}",
                    e
                ),
                sources: Vec::new(),
                context_used: 0,
                success: false,
                error: Some(format!("{:#}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn fused(id: u64, source: &str, page: u32, score: f64, text: &str) -> FusedResult {
        FusedResult {
            chunk: Chunk {
                text: text.to_string(),
                token_count: 1,
                source_file: source.to_string(),
                page_number: page,
                chunk_id: id,
                session_id: None,
            },
            lexical_score: score,
            vector_score: score,
            combined_score: score,
        }
    }

    struct Echo(Result<String, String>);

    #[async_trait]
    impl AnswerGenerator for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    #[test]
    fn test_no_results_message_by_scope() {
        assert_eq!(
            no_results_message(ScopeKind::Session),
            "I couldn't find any relevant information in the current session to answer your question."
        );
        assert_eq!(
            no_results_message(ScopeKind::Selected),
            "I couldn't find any relevant information in the selected documents to answer your question."
        );
        assert_eq!(
            no_results_message(ScopeKind::All),
            "I couldn't find any relevant information to answer your question."
        );
    }

    #[test]
    fn test_sources_dedup_keeps_highest_score() {
        let results = vec![
            fused(1, "a.pdf", 1, 0.4, "low"),
            fused(2, "a.pdf", 1, 0.9, "high"),
            fused(3, "b.pdf", 2, 0.6, "other"),
        ];
        let sources = prepare_sources(&results);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_file, "a.pdf");
        assert_eq!(sources[0].chunk_text, "high");
        assert_eq!(sources[0].relevance_score, 0.9);
        assert_eq!(sources[1].source_file, "b.pdf");
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let short = "é".repeat(EXCERPT_CHARS);
        assert_eq!(excerpt(&short), short);
        let long = "é".repeat(EXCERPT_CHARS + 1);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
    }

    #[test]
    fn test_context_blocks_are_numbered() {
        let ctx = build_context(&[fused(1, "a.pdf", 3, 1.0, "alpha"), fused(2, "b.pdf", 1, 0.5, "beta")]);
        assert!(ctx.contains("Context 1 (Source: a.pdf, Page: 3):\nalpha"));
        assert!(ctx.contains("Context 2 (Source: b.pdf, Page: 1):\nbeta"));
        assert!(build_prompt("why?", &ctx).contains("QUESTION: why?"));
    }

    #[tokio::test]
    async fn test_answer_without_results_skips_model() {
        let gen = Echo(Err("must not be called".into()));
        let answer = answer_question(&gen, "q", &[], ScopeKind::Session).await;
        assert!(answer.success);
        assert!(answer.answer.contains("in the current session"));
    }

    #[tokio::test]
    async fn test_answer_blank_completion_uses_fallback() {
        let gen = Echo(Ok("   ".into()));
        let answer = answer_question(&gen, "q", &[fused(1, "a.pdf", 1, 1.0, "t")], ScopeKind::All).await;
        assert_eq!(answer.answer, EMPTY_ANSWER_FALLBACK);
        assert_eq!(answer.context_used, 1);
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_model_error_is_reported() {
        let gen = Echo(Err("quota".into()));
        let answer = answer_question(&gen, "q", &[fused(1, "a.pdf", 1, 1.0, "t")], ScopeKind::All).await;
        assert!(!answer.success);
        assert_eq!(answer.error.as_deref(), Some("quota"));
        assert!(answer.sources.is_empty());
    }
}
