//! # Research RAG
//!
//! A local-first research assistant. Upload PDFs and text files, then ask
//! questions that are answered from the uploaded pages, with citations.
//!
//! Retrieval is hybrid: a BM25 keyword index and an embedding index are
//! queried under the same scope (one upload session, a set of files, or
//! everything), their scores are min-max normalized, and the weighted sum
//! ranks the final results. The ranking core lives in
//! [`research_rag_core`]; this crate adds storage, extraction, providers,
//! and the `rag` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────────┐   ┌──────────────────────┐
//! │ PDF / txt │──▶│ Extract+Chunk │──▶│ SQLite               │
//! └───────────┘   └───────────────┘   │ chunks · BM25 · vecs │
//!                                     └──────────┬───────────┘
//!                                                ▼
//!                       ┌────────────────────────────────┐
//!                       │ HybridRetriever (scope → fuse) │
//!                       └───────────────┬────────────────┘
//!                                       ▼
//!                         search  ·  ask (Gemini + citations)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init
//! rag ingest ./papers            # prints the session id
//! rag search "attention heads" --session-id <id>
//! rag ask "What is self-attention?" --scope all
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`extract`] | PDF and text page extraction |
//! | [`ingest`] | Upload pipeline and reindexing |
//! | [`sqlite_store`] | SQLite-backed lexical snapshot, vector index, documents |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Answer generation |
//! | [`retrieval`] | Retriever wiring |
//! | [`search`] | Search, ask, and summarize commands |
//! | [`admin`] | Documents, stats, clear, correct, page commands |

pub mod admin;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod retrieval;
pub mod search;
pub mod sqlite_store;
