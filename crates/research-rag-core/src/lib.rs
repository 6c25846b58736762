//! # Research RAG Core
//!
//! Shared, WASM-safe retrieval logic for Research RAG: data models,
//! sentence-aware chunking, the lexical (BM25) index, the vector-store
//! contract, score fusion, and scope filtering.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Persistent storage, embedding backends, and
//! the language-model call live in the `research-rag` app crate and plug in
//! through the traits defined here.
//!
//! ## Query flow
//!
//! ```text
//!  scope ──▶ ScopePredicate ──┬──▶ LexicalIndex::query ──┐
//!                             │                          ├──▶ fuse ──▶ top-k
//!  question ──▶ embed ────────┴──▶ VectorIndex::query ───┘
//! ```

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod lexical;
pub mod models;
pub mod retriever;
pub mod scope;
pub mod store;
pub mod tokenize;
pub mod vector;
