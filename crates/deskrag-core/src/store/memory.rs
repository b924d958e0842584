//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Similarity search
//! is brute-force cosine similarity over all stored chunk vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{
    ChunkRecord, DocType, Document, DocumentDraft, DocumentStatus, RetrievedChunk,
    SuggestionLogEntry,
};

use super::{DocumentFilter, MatchQuery, Store};

/// In-memory store. Cheap to construct; one per test.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<ChunkRecord>>,
    suggestion_logs: RwLock<Vec<SuggestionLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            suggestion_logs: RwLock::new(Vec::new()),
        }
    }

    fn docs(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Document>>> {
        self.docs
            .read()
            .map_err(|_| Error::Upstream("document table lock poisoned".into()))
    }

    fn docs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Document>>> {
        self.docs
            .write()
            .map_err(|_| Error::Upstream("document table lock poisoned".into()))
    }

    fn chunks(&self) -> Result<RwLockReadGuard<'_, Vec<ChunkRecord>>> {
        self.chunks
            .read()
            .map_err(|_| Error::Upstream("chunk table lock poisoned".into()))
    }

    fn chunks_mut(&self) -> Result<RwLockWriteGuard<'_, Vec<ChunkRecord>>> {
        self.chunks
            .write()
            .map_err(|_| Error::Upstream("chunk table lock poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_active_by_title(&self, title: &str) -> Result<Option<Document>> {
        let docs = self.docs()?;
        Ok(docs
            .values()
            .find(|d| d.title == title && d.status.is_active())
            .cloned())
    }

    async fn insert_version(
        &self,
        draft: &DocumentDraft,
        version: i64,
        supersedes: Option<&str>,
    ) -> Result<Document> {
        let mut docs = self.docs_mut()?;
        let now = Utc::now();
        if let Some(old_id) = supersedes {
            let old = docs
                .get_mut(old_id)
                .ok_or_else(|| Error::NotFound(format!("document {}", old_id)))?;
            if !old.status.is_active() {
                return Err(Error::Upstream(format!(
                    "document {} is no longer active",
                    old_id
                )));
            }
            old.status = old.status.supersede();
            old.updated_at = now;
        }

        let doc = Document {
            id: Uuid::new_v4().to_string(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            doc_type: draft.doc_type,
            metadata: draft.metadata.clone(),
            version,
            status: DocumentStatus::Active,
            created_at: now,
            updated_at: now,
        };
        docs.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs()?.get(id).cloned())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let docs = self.docs()?;
        let mut out: Vec<Document> = docs
            .values()
            .filter(|d| !filter.active_only || d.status.is_active())
            .filter(|d| filter.doc_type.map_or(true, |t| d.doc_type == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.title.cmp(&b.title).then(a.version.cmp(&b.version)));
        Ok(out)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let removed = self.docs_mut()?.remove(id).is_some();
        if removed {
            self.chunks_mut()?.retain(|c| c.document_id != id);
        }
        Ok(removed)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let mut chunks = self.chunks_mut()?;
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        Ok((before - chunks.len()) as u64)
    }

    async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<()> {
        if self.docs()?.get(&chunk.document_id).is_none() {
            return Err(Error::Upstream(format!(
                "chunk references missing document {}",
                chunk.document_id
            )));
        }
        let mut chunks = self.chunks_mut()?;
        if chunks
            .iter()
            .any(|c| c.document_id == chunk.document_id && c.chunk_index == chunk.chunk_index)
        {
            return Err(Error::Upstream(format!(
                "duplicate chunk {} for document {}",
                chunk.chunk_index, chunk.document_id
            )));
        }
        chunks.push(chunk.clone());
        Ok(())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let mut out: Vec<ChunkRecord> = self
            .chunks()?
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn match_chunks(&self, query: &MatchQuery<'_>) -> Result<Vec<RetrievedChunk>> {
        let docs = self.docs()?;
        let chunks = self.chunks()?;
        let mut scored: Vec<(f64, &ChunkRecord)> = chunks
            .iter()
            .filter(|c| query.document_id.map_or(true, |id| c.document_id == id))
            .filter(|c| docs.get(&c.document_id).is_some_and(|d| d.status.is_active()))
            .map(|c| (cosine_similarity(query.embedding, &c.embedding) as f64, c))
            .filter(|(sim, _)| *sim >= query.threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.document_id.cmp(&b.1.document_id))
                .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
        });
        scored.truncate(query.limit);

        Ok(scored
            .into_iter()
            .map(|(similarity, c)| RetrievedChunk {
                content: c.content.clone(),
                similarity,
                document_id: c.document_id.clone(),
            })
            .collect())
    }

    async fn count_chunks(&self) -> Result<i64> {
        let docs = self.docs()?;
        let chunks = self.chunks()?;
        Ok(chunks
            .iter()
            .filter(|c| docs.get(&c.document_id).is_some_and(|d| d.status.is_active()))
            .count() as i64)
    }

    async fn count_documents_by_type(&self) -> Result<Vec<(DocType, i64)>> {
        let docs = self.docs()?;
        let mut counts: HashMap<DocType, i64> = HashMap::new();
        for d in docs.values().filter(|d| d.status.is_active()) {
            *counts.entry(d.doc_type).or_insert(0) += 1;
        }
        let mut out: Vec<(DocType, i64)> = counts.into_iter().collect();
        out.sort();
        Ok(out)
    }

    async fn insert_suggestion_log(&self, entry: &SuggestionLogEntry) -> Result<()> {
        self.suggestion_logs
            .write()
            .map_err(|_| Error::Upstream("suggestion log lock poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }

    async fn list_suggestion_logs(&self, ticket_id: &str) -> Result<Vec<SuggestionLogEntry>> {
        Ok(self
            .suggestion_logs
            .read()
            .map_err(|_| Error::Upstream("suggestion log lock poisoned".into()))?
            .iter()
            .filter(|e| e.ticket_id == ticket_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::content_hash;
    use crate::models::DocumentMetadata;

    fn chunk(doc: &str, index: i64, content: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: Uuid::new_v4().to_string(),
            document_id: doc.to_string(),
            chunk_index: index,
            content: content.to_string(),
            token_count: 1,
            hash: content_hash(content),
            embedding,
            metadata: DocumentMetadata::default(),
        }
    }

    #[tokio::test]
    async fn insert_version_supersedes_previous() {
        let store = InMemoryStore::new();
        let draft = DocumentDraft::new("Refunds", "v1", DocType::Policy);
        let v1 = store.insert_version(&draft, 1, None).await.unwrap();
        let v2 = store.insert_version(&draft, 2, Some(&v1.id)).await.unwrap();

        let old = store.get_document(&v1.id).await.unwrap().unwrap();
        assert_eq!(old.status, DocumentStatus::Superseded);
        let active = store.find_active_by_title("Refunds").await.unwrap().unwrap();
        assert_eq!(active.id, v2.id);
        assert_eq!(active.version, 2);
    }

    #[tokio::test]
    async fn superseding_a_stale_version_is_rejected() {
        let store = InMemoryStore::new();
        let draft = DocumentDraft::new("Refunds", "v1", DocType::Policy);
        let v1 = store.insert_version(&draft, 1, None).await.unwrap();
        let v2 = store.insert_version(&draft, 2, Some(&v1.id)).await.unwrap();

        let err = store
            .insert_version(&draft, 3, Some(&v1.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));

        let all = store
            .list_documents(&DocumentFilter {
                active_only: true,
                doc_type: None,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, v2.id);
    }

    #[tokio::test]
    async fn match_skips_superseded_and_filters_threshold() {
        let store = InMemoryStore::new();
        let draft = DocumentDraft::new("Doc", "x", DocType::Faq);
        let old = store.insert_version(&draft, 1, None).await.unwrap();
        store
            .insert_chunk(&chunk(&old.id, 0, "old", vec![1.0, 0.0]))
            .await
            .unwrap();
        let new = store.insert_version(&draft, 2, Some(&old.id)).await.unwrap();
        store
            .insert_chunk(&chunk(&new.id, 0, "aligned", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert_chunk(&chunk(&new.id, 1, "orthogonal", vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store
            .match_chunks(&MatchQuery {
                embedding: &[1.0, 0.0],
                limit: 5,
                threshold: 0.5,
                document_id: None,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "aligned");
        assert_eq!(hits[0].document_id, new.id);
        assert_eq!(store.count_chunks().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_cascades_to_chunks() {
        let store = InMemoryStore::new();
        let doc = store
            .insert_version(&DocumentDraft::new("A", "a", DocType::Faq), 1, None)
            .await
            .unwrap();
        store
            .insert_chunk(&chunk(&doc.id, 0, "a", vec![1.0]))
            .await
            .unwrap();
        assert!(store.delete_document(&doc.id).await.unwrap());
        assert!(store.list_chunks(&doc.id).await.unwrap().is_empty());
        assert!(!store.delete_document(&doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_duplicate_chunk_index() {
        let store = InMemoryStore::new();
        let doc = store
            .insert_version(&DocumentDraft::new("A", "a", DocType::Faq), 1, None)
            .await
            .unwrap();
        store
            .insert_chunk(&chunk(&doc.id, 0, "a", vec![1.0]))
            .await
            .unwrap();
        let err = store
            .insert_chunk(&chunk(&doc.id, 0, "b", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
