//! # deskrag
//!
//! A support-desk knowledge base with retrieval-augmented answers.
//!
//! Articles (FAQs, policies, help articles, API docs) are split into
//! overlapping token windows, embedded, and stored in SQLite. Questions are
//! embedded the same way, matched against stored chunks by cosine
//! similarity, and answered by a chat model using only the retrieved
//! context. Every edit creates a new document version; only the latest
//! version of a title is searchable.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ HTTP / CLI│──▶│  Processor   │──▶│  SQLite  │
//! │  actions  │   │ Chunk+Embed  │   │ docs+vec │
//! └─────┬─────┘   └──────────────┘   └────┬─────┘
//!       │                                  │
//!       ▼                                  ▼
//!  ┌──────────┐    embed + match     ┌──────────┐
//!  │   RAG    │◀────────────────────│  Store   │
//!  │ service  │──▶ chat completion   └──────────┘
//!  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! deskrag init
//! deskrag import ./kb --type help_article
//! deskrag query "How long do refunds take?"
//! deskrag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite implementation of the store trait |
//! | [`embedding`] / [`completion`] | Provider clients |
//! | [`tokenizer`] | Tokenizer selection |
//! | [`processor`] | Document versioning, chunking and batch processing |
//! | [`suggest`] | Ticket reply suggestions |
//! | [`auth`] | Session lookup and role checks |
//! | [`server`] | HTTP action API |
//!
//! Domain types, the chunker and the RAG service live in `deskrag-core`.

pub mod ask;
pub mod auth;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod import;
pub mod migrate;
pub mod processor;
pub mod progress;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod suggest;
pub mod tokenizer;
