//! Search, question answering, and document summaries.
//!
//! `search` prints the fused ranking; `ask` feeds the same ranking to the
//! answer generator and prints the answer with its page citations.
//! Both resolve a scope first and pass the resulting predicate to the
//! retriever, so a session or file selection can never widen.

use anyhow::{anyhow, bail, Result};
use tracing::debug;

use research_rag_core::answer::{self, Answer};
use research_rag_core::models::FusedResult;
use research_rag_core::retriever::SearchOptions;
use research_rag_core::scope::{self, ScopeKind, ScopePredicate};

use crate::config::Config;
use crate::db;
use crate::llm;
use crate::retrieval;
use crate::sqlite_store;

/// Scope and ranking flags shared by `search` and `ask`.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    /// Explicit scope. When absent it is inferred from the other flags.
    pub scope: Option<ScopeKind>,
    pub session_id: Option<String>,
    pub sources: Vec<String>,
    pub top_k: Option<usize>,
    pub lexical_weight: Option<f64>,
    pub vector_weight: Option<f64>,
    pub json: bool,
}

impl QueryArgs {
    /// `--session-id` implies session scope, `--source` implies selected,
    /// and neither means the whole corpus.
    pub fn scope_kind(&self) -> ScopeKind {
        match self.scope {
            Some(kind) => kind,
            None if self.session_id.is_some() => ScopeKind::Session,
            None if !self.sources.is_empty() => ScopeKind::Selected,
            None => ScopeKind::All,
        }
    }

    pub fn predicate(&self) -> ScopePredicate {
        scope::resolve(
            self.scope_kind(),
            self.session_id.as_deref(),
            Some(self.sources.as_slice()),
        )
    }

    pub fn options(&self, config: &Config) -> Result<SearchOptions> {
        let mut options = config.retrieval.search_options();
        if let Some(k) = self.top_k {
            if k == 0 {
                bail!("--top-k must be >= 1");
            }
            options.top_k = k;
        }
        if let Some(w) = self.lexical_weight {
            options.weights.lexical = check_weight("--lexical-weight", w)?;
        }
        if let Some(w) = self.vector_weight {
            options.weights.vector = check_weight("--vector-weight", w)?;
        }
        Ok(options)
    }
}

fn check_weight(flag: &str, w: f64) -> Result<f64> {
    if !w.is_finite() || w < 0.0 {
        bail!("{} must be a finite number >= 0", flag);
    }
    Ok(w)
}

async fn retrieve(config: &Config, query: &str, args: &QueryArgs) -> Result<Vec<FusedResult>> {
    let options = args.options(config)?;
    let predicate = args.predicate();

    let pool = db::connect(config).await?;
    let retriever = retrieval::open_retriever(config, &pool).await?;
    let results = retriever.hybrid_search(query, &options, &predicate).await;
    debug!(scope = %args.scope_kind(), results = results.len(), "retrieved");

    pool.close().await;
    Ok(results)
}

pub async fn run_search(config: &Config, query: &str, args: &QueryArgs) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let results = retrieve(config, query, args).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / page {}",
            i + 1,
            result.combined_score,
            result.chunk.source_file,
            result.chunk.page_number
        );
        println!(
            "    lexical: {:.2}  vector: {:.2}",
            result.lexical_score, result.vector_score
        );
        println!(
            "    excerpt: \"{}\"",
            answer::excerpt(&result.chunk.text).replace('\n', " ").trim()
        );
        println!("    chunk: {}", result.chunk.chunk_id);
        println!();
    }
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, args: &QueryArgs) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    let generator = llm::create_generator(&config.llm)?
        .ok_or_else(|| anyhow!("ask requires an answer model. Set [llm] provider in config."))?;

    let results = retrieve(config, question, args).await?;
    let answer =
        answer::answer_question(generator.as_ref(), question, &results, args.scope_kind()).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }

    match answer.error {
        Some(e) if !answer.success => bail!("answer generation failed: {}", e),
        _ => Ok(()),
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    if answer.sources.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, source) in answer.sources.iter().enumerate() {
        println!(
            "  {}. [{:.2}] {} / page {}",
            i + 1,
            source.relevance_score,
            source.source_file,
            source.page_number
        );
        println!(
            "     \"{}\"",
            source.chunk_text.replace('\n', " ").trim()
        );
    }
}

/// Summarize one document from its leading chunks.
pub async fn run_summarize(config: &Config, source_file: &str) -> Result<()> {
    let generator = llm::create_generator(&config.llm)?.ok_or_else(|| {
        anyhow!("summarize requires an answer model. Set [llm] provider in config.")
    })?;

    let pool = db::connect(config).await?;
    let chunks = sqlite_store::chunks_for_source(&pool, source_file).await?;
    pool.close().await;

    if chunks.is_empty() {
        bail!("No document named '{}'", source_file);
    }

    let summary = generator
        .generate(&answer::build_summary_prompt(&chunks))
        .await?;
    if summary.trim().is_empty() {
        println!("{}", answer::EMPTY_ANSWER_FALLBACK);
    } else {
        println!("{}", summary.trim());
    }
    Ok(())
}
