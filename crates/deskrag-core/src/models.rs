//! Core data models for the knowledge base.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the processing and query pipeline. Wire-facing types
//! (anything returned by the HTTP API) serialize in camelCase.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The fixed set of knowledge-base document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Faq,
    Policy,
    HelpArticle,
    ApiDoc,
}

impl DocType {
    pub const ALL: [DocType; 4] = [
        DocType::Faq,
        DocType::Policy,
        DocType::HelpArticle,
        DocType::ApiDoc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Faq => "faq",
            DocType::Policy => "policy",
            DocType::HelpArticle => "help_article",
            DocType::ApiDoc => "api_doc",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faq" => Ok(DocType::Faq),
            "policy" => Ok(DocType::Policy),
            "help_article" => Ok(DocType::HelpArticle),
            "api_doc" => Ok(DocType::ApiDoc),
            other => Err(Error::Validation(format!(
                "invalid doc_type '{}': expected faq, policy, help_article, or api_doc",
                other
            ))),
        }
    }
}

/// Lifecycle of a titled document row.
///
/// Updating a document never mutates content in place: a new row is
/// inserted and the previous active row is superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Superseded,
}

impl DocumentStatus {
    /// Transition applied to the previous version when a new one is created.
    pub fn supersede(self) -> Self {
        DocumentStatus::Superseded
    }

    pub fn is_active(self) -> bool {
        matches!(self, DocumentStatus::Active)
    }

    pub fn from_active_flag(is_active: bool) -> Self {
        if is_active {
            DocumentStatus::Active
        } else {
            DocumentStatus::Superseded
        }
    }
}

/// Document metadata with the keys the support team actually uses.
///
/// Anything else lands in `extra` so imported documents keep their
/// original fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<NaiveDate>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentMetadata {
    /// Overlay `other` onto `self`: set fields in `other` win, tags and
    /// extra keys are merged.
    pub fn merge(&self, other: &DocumentMetadata) -> DocumentMetadata {
        let mut merged = self.clone();
        if other.department.is_some() {
            merged.department = other.department.clone();
        }
        for tag in &other.tags {
            if !merged.tags.contains(tag) {
                merged.tags.push(tag.clone());
            }
        }
        if other.last_reviewed.is_some() {
            merged.last_reviewed = other.last_reviewed;
        }
        for (k, v) in &other.extra {
            merged.extra.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// Input for creating a document (or a new version of one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub title: String,
    pub content: String,
    pub doc_type: DocType,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl DocumentDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>, doc_type: DocType) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            doc_type,
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("document title must not be empty".into()));
        }
        if self.content.trim().is_empty() {
            return Err(Error::Validation("document content must not be empty".into()));
        }
        Ok(())
    }

    /// Merge a partial update over this draft.
    pub fn apply(mut self, update: &DocumentUpdate) -> Self {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(content) = &update.content {
            self.content = content.clone();
        }
        if let Some(doc_type) = update.doc_type {
            self.doc_type = doc_type;
        }
        if let Some(metadata) = &update.metadata {
            self.metadata = self.metadata.merge(metadata);
        }
        self
    }
}

/// Partial update; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub doc_type: Option<DocType>,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
}

/// A stored document row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub doc_type: DocType,
    pub metadata: DocumentMetadata,
    /// Starts at 1, incremented per new version of the same title.
    pub version: i64,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn to_draft(&self) -> DocumentDraft {
        DocumentDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            doc_type: self.doc_type,
            metadata: self.metadata.clone(),
        }
    }
}

/// A persisted chunk with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    /// 0-based, contiguous per document.
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
    /// SHA-256 of `content`.
    pub hash: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// One ranked retrieval hit. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub content: String,
    /// Cosine similarity in `[0, 1]` for the thresholds we use.
    pub similarity: f64,
    pub document_id: String,
}

/// Answer returned by the query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub answer: String,
    pub relevant_chunks: Vec<RetrievedChunk>,
    /// Mean similarity of `relevant_chunks`, 0 when empty.
    pub confidence: f64,
}

/// What an agent did with a suggested reply, as posted by the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionFeedback {
    pub ticket_id: String,
    pub original_suggestion: String,
    #[serde(default)]
    pub final_message: Option<String>,
    #[serde(default)]
    pub was_modified: bool,
    #[serde(default)]
    pub was_used: bool,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A stored `suggestions_log` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionLogEntry {
    pub id: String,
    pub ticket_id: String,
    pub user_id: String,
    pub original_suggestion: String,
    pub final_message: Option<String>,
    pub was_modified: bool,
    pub was_used: bool,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
