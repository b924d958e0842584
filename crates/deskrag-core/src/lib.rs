//! # deskrag core
//!
//! Runtime-agnostic logic for the deskrag support knowledge base: data
//! models, the error taxonomy, tokenizer-aware chunking, provider traits,
//! the store abstraction, and the RAG query service.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! The `deskrag` app crate supplies the SQLite store, provider clients,
//! the document processor, and the HTTP API.

pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod models;
pub mod rag;
pub mod store;
pub mod tokenizer;
