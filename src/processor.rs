//! Document processor: versioning, chunking, embedding, persistence.
//!
//! # Processing a document
//!
//! 1. Take the per-title lock.
//! 2. Look up the active document with the same title.
//! 3. `version = existing.version + 1`, or 1 for a new title.
//! 4. Insert the new row; the store supersedes the previous one in the
//!    same transaction.
//! 5. Chunk the content with the configured tokenizer.
//! 6. Embed and insert every chunk, `embed_concurrency` at a time.
//!
//! A failing chunk fails the whole call, naming the lowest failing chunk
//! index. Chunks already written stay in place.
//!
//! # Batches
//!
//! [`DocumentProcessor::batch_process_documents`] runs documents through a
//! semaphore-gated pool of `batch_concurrency` workers. Document *i* may
//! not start before `batch_delay × (i / batch_concurrency)` has elapsed
//! since the batch began, which paces requests toward the embedding
//! provider. Each document's outcome is recorded independently.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use deskrag_core::chunk::{chunk_text, content_hash};
use deskrag_core::embedding::Embedder;
use deskrag_core::error::{Error, Result};
use deskrag_core::models::{
    ChunkRecord, DocType, Document, DocumentDraft, DocumentMetadata, DocumentUpdate,
};
use deskrag_core::store::{DocumentFilter, Store};
use deskrag_core::tokenizer::Tokenizer;

use crate::config::Config;
use crate::progress::{BatchProgressEvent, ProgressCallback};
use crate::stats::{self, ProcessingStats};

/// Chunking and concurrency settings.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_concurrency: usize,
    pub batch_concurrency: usize,
    pub batch_delay: Duration,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            embed_concurrency: 3,
            batch_concurrency: 3,
            batch_delay: Duration::from_secs(1),
        }
    }
}

impl ProcessingConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.max_tokens,
            chunk_overlap: config.chunking.overlap_tokens,
            embed_concurrency: config.processing.embed_concurrency.max(1),
            batch_concurrency: config.processing.batch_concurrency.max(1),
            batch_delay: Duration::from_millis(config.processing.batch_delay_ms),
        }
    }
}

/// Options for one batch run.
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Overrides `batch_concurrency` for this batch.
    pub concurrency: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
}

/// Result of one document in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    fn from_result(result: &Result<String>) -> Self {
        match result {
            Ok(id) => Self {
                success: true,
                document_id: Some(id.clone()),
                error: None,
            },
            Err(e) => Self {
                success: false,
                document_id: None,
                error: Some(e.to_string()),
            },
        }
    }
}

pub struct DocumentProcessor {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn Tokenizer>,
    config: ProcessingConfig,
    title_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DocumentProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn Tokenizer>,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            tokenizer,
            config,
            title_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Serialize version bookkeeping for one title within this process.
    async fn lock_title(&self, title: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .title_locks
                .lock()
                .map_err(|_| Error::Upstream("title lock table poisoned".into()))?;
            // Drop locks nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(title.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Create a document, or a new version of the active document with the
    /// same title. Returns the new document id.
    pub async fn process_document(&self, draft: DocumentDraft) -> Result<String> {
        draft.validate()?;
        let _guard = self.lock_title(&draft.title).await?;

        let existing = self
            .store
            .find_active_by_title(&draft.title)
            .await
            .map_err(|e| e.context(format!("looking up '{}'", draft.title)))?;
        let version = existing.as_ref().map_or(1, |d| d.version + 1);

        let doc = self
            .store
            .insert_version(&draft, version, existing.as_ref().map(|d| d.id.as_str()))
            .await?;
        info!(
            title = %doc.title,
            id = %doc.id,
            version,
            doc_type = %doc.doc_type,
            "inserted document version"
        );

        self.build_chunks(&doc).await?;
        Ok(doc.id)
    }

    /// Merge `update` over document `id` and store the result as a new
    /// version. Returns the new version's id.
    pub async fn update_document(&self, id: &str, update: &DocumentUpdate) -> Result<String> {
        let current = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        if !current.status.is_active() {
            return Err(Error::Validation(format!(
                "document {} is superseded; update the active version of '{}'",
                id, current.title
            )));
        }

        let merged = current.to_draft().apply(update);
        if merged.title == current.title {
            return self.process_document(merged).await;
        }

        // Renamed: the new row continues this document's history.
        merged.validate()?;
        let (first, second) = if current.title < merged.title {
            (&current.title, &merged.title)
        } else {
            (&merged.title, &current.title)
        };
        let _g1 = self.lock_title(first).await?;
        let _g2 = self.lock_title(second).await?;

        if self.store.find_active_by_title(&merged.title).await?.is_some() {
            return Err(Error::Validation(format!(
                "an active document titled '{}' already exists",
                merged.title
            )));
        }
        let doc = self
            .store
            .insert_version(&merged, current.version + 1, Some(&current.id))
            .await?;
        info!(from = %current.title, to = %doc.title, version = doc.version, "renamed document");
        self.build_chunks(&doc).await?;
        Ok(doc.id)
    }

    /// Rebuild the chunks of document `id` in place, keeping its version.
    pub async fn reprocess_document(&self, id: &str) -> Result<()> {
        let doc = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        let _guard = self.lock_title(&doc.title).await?;

        let removed = self.store.delete_chunks(&doc.id).await?;
        debug!(id, removed, "cleared chunks");
        self.build_chunks(&doc).await
    }

    pub async fn delete_document(&self, id: &str) -> Result<()> {
        if !self.store.delete_document(id).await? {
            return Err(Error::NotFound(format!("document {}", id)));
        }
        info!(id, "deleted document");
        Ok(())
    }

    /// Chunk, embed and persist `doc`'s content.
    async fn build_chunks(&self, doc: &Document) -> Result<()> {
        let chunks = chunk_text(
            self.tokenizer.as_ref(),
            &doc.content,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;
        let total = chunks.len();
        debug!(
            title = %doc.title,
            chunks = total,
            tokenizer = self.tokenizer.name(),
            "chunked document"
        );

        let metadata = chunk_metadata(doc);
        let results: Vec<(usize, Result<()>)> = stream::iter(chunks.into_iter().enumerate())
            .map(|(index, chunk)| {
                let metadata = metadata.clone();
                async move {
                    let result = async {
                        let embedding = self.embedder.embed(&chunk.content).await?;
                        self.store
                            .insert_chunk(&ChunkRecord {
                                id: Uuid::new_v4().to_string(),
                                document_id: doc.id.clone(),
                                chunk_index: index as i64,
                                hash: content_hash(&chunk.content),
                                token_count: chunk.token_count as i64,
                                content: chunk.content,
                                embedding,
                                metadata,
                            })
                            .await
                    }
                    .await;
                    (index, result)
                }
            })
            .buffer_unordered(self.config.embed_concurrency.max(1))
            .collect()
            .await;

        let failed = results
            .into_iter()
            .filter_map(|(index, r)| r.err().map(|e| (index, e)))
            .min_by_key(|(index, _)| *index);
        if let Some((index, err)) = failed {
            warn!(title = %doc.title, chunk = index, error = %err, "chunk failed");
            return Err(err.context(format!(
                "document '{}' chunk {} of {}",
                doc.title, index, total
            )));
        }

        info!(title = %doc.title, version = doc.version, chunks = total, "stored chunks");
        Ok(())
    }

    /// Process many documents with bounded concurrency. One failure does
    /// not affect the others. Keyed by title.
    pub async fn batch_process_documents(
        &self,
        drafts: Vec<DocumentDraft>,
        options: BatchOptions,
    ) -> BTreeMap<String, BatchOutcome> {
        let concurrency = options
            .concurrency
            .unwrap_or(self.config.batch_concurrency)
            .max(1);
        let total = drafts.len();
        let semaphore = Semaphore::new(concurrency);
        let completed = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        info!(total, concurrency, "starting batch");

        let tasks = drafts.into_iter().enumerate().map(|(i, draft)| {
            let semaphore = &semaphore;
            let completed = &completed;
            let on_progress = options.on_progress.clone();
            async move {
                let group = (i / concurrency) as u32;
                tokio::time::sleep_until(started + self.config.batch_delay * group).await;

                let title = draft.title.clone();
                let result = match semaphore.acquire().await {
                    Ok(_permit) => self.process_document(draft).await,
                    Err(e) => Err(Error::upstream(e)),
                };
                if let Err(e) = &result {
                    warn!(title = %title, error = %e, "batch document failed");
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = &on_progress {
                    cb(&BatchProgressEvent {
                        completed: done,
                        total,
                        title: title.clone(),
                        success: result.is_ok(),
                    });
                }
                (title, BatchOutcome::from_result(&result))
            }
        });

        let outcomes: BTreeMap<String, BatchOutcome> = join_all(tasks).await.into_iter().collect();
        let failed = outcomes.values().filter(|o| !o.success).count();
        info!(total, failed, "batch finished");
        outcomes
    }

    /// Re-run every active document (optionally one type) through the batch
    /// pipeline, e.g. after changing the embedding model or chunk size.
    pub async fn reprocess_all_documents(
        &self,
        doc_type: Option<DocType>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<BTreeMap<String, BatchOutcome>> {
        let docs = self
            .store
            .list_documents(&DocumentFilter {
                active_only: true,
                doc_type,
            })
            .await?;
        let drafts = docs.iter().map(Document::to_draft).collect();
        Ok(self
            .batch_process_documents(
                drafts,
                BatchOptions {
                    concurrency: None,
                    on_progress,
                },
            )
            .await)
    }

    pub async fn get_processing_stats(&self) -> Result<ProcessingStats> {
        stats::collect(self.store.as_ref()).await
    }
}

/// Document metadata plus the keys retrieval consumers filter on.
fn chunk_metadata(doc: &Document) -> DocumentMetadata {
    let mut metadata = doc.metadata.clone();
    metadata
        .extra
        .insert("title".into(), serde_json::json!(doc.title));
    metadata
        .extra
        .insert("doc_type".into(), serde_json::json!(doc.doc_type.as_str()));
    metadata
        .extra
        .insert("version".into(), serde_json::json!(doc.version));
    metadata
}
