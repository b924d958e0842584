//! Storage abstraction for the knowledge base.
//!
//! The [`Store`] trait defines every persistence operation the document
//! processor and the query service need, enabling pluggable backends
//! (SQLite in the app crate, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ChunkRecord, DocType, Document, DocumentDraft, RetrievedChunk, SuggestionLogEntry,
};

/// Filter for [`Store::list_documents`].
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Only rows whose status is `Active`.
    pub active_only: bool,
    pub doc_type: Option<DocType>,
}

impl DocumentFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            doc_type: None,
        }
    }
}

/// Similarity search request.
#[derive(Debug, Clone)]
pub struct MatchQuery<'a> {
    pub embedding: &'a [f32],
    /// Maximum number of chunks returned.
    pub limit: usize,
    /// Minimum cosine similarity (inclusive).
    pub threshold: f64,
    /// Restrict matches to one document.
    pub document_id: Option<&'a str>,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_active_by_title`](Store::find_active_by_title) | Current version of a titled document |
/// | [`insert_version`](Store::insert_version) | Insert a document row, superseding the previous one |
/// | [`get_document`](Store::get_document) | Document by id, any status |
/// | [`list_documents`](Store::list_documents) | Documents by status / type |
/// | [`delete_document`](Store::delete_document) | Remove a document and its chunks |
/// | [`delete_chunks`](Store::delete_chunks) | Remove all chunks of a document |
/// | [`insert_chunk`](Store::insert_chunk) | Persist one chunk with its embedding |
/// | [`list_chunks`](Store::list_chunks) | Chunks of a document ordered by index |
/// | [`match_chunks`](Store::match_chunks) | Cosine similarity search over active documents |
/// | [`count_chunks`](Store::count_chunks) | Chunks belonging to active documents |
/// | [`count_documents_by_type`](Store::count_documents_by_type) | Active documents per type |
/// | [`insert_suggestion_log`](Store::insert_suggestion_log) | Record what happened to a suggested reply |
/// | [`list_suggestion_logs`](Store::list_suggestion_logs) | Suggestion log rows of a ticket, oldest first |
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_active_by_title(&self, title: &str) -> Result<Option<Document>>;

    /// Insert `draft` as a new active row with `version`.
    ///
    /// When `supersedes` is set, that row is marked superseded as part of
    /// the same operation. The store assigns the new id.
    async fn insert_version(
        &self,
        draft: &DocumentDraft,
        version: i64,
        supersedes: Option<&str>,
    ) -> Result<Document>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>>;

    /// Delete a document row and cascade to its chunks. Returns `false`
    /// when no such document exists.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Delete all chunks of a document, returning how many were removed.
    async fn delete_chunks(&self, document_id: &str) -> Result<u64>;

    async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<()>;

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>>;

    /// Rank chunks of active documents by cosine similarity to
    /// `query.embedding`, keeping those `>= query.threshold`.
    async fn match_chunks(&self, query: &MatchQuery<'_>) -> Result<Vec<RetrievedChunk>>;

    async fn count_chunks(&self) -> Result<i64>;

    async fn count_documents_by_type(&self) -> Result<Vec<(DocType, i64)>>;

    async fn insert_suggestion_log(&self, entry: &SuggestionLogEntry) -> Result<()>;

    async fn list_suggestion_logs(&self, ticket_id: &str) -> Result<Vec<SuggestionLogEntry>>;
}
