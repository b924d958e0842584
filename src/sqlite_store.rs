//! SQLite-backed [`Store`] implementation.
//!
//! Embeddings are stored as little-endian f32 BLOBs and ranked in process
//! with brute-force cosine similarity. Version bookkeeping relies on the
//! partial unique index `idx_documents_active_title` created by
//! [`crate::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use deskrag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use deskrag_core::error::{Error, Result};
use deskrag_core::models::{
    ChunkRecord, DocType, Document, DocumentDraft, DocumentMetadata, DocumentStatus,
    RetrievedChunk, SuggestionLogEntry,
};
use deskrag_core::store::{DocumentFilter, MatchQuery, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Upstream(format!("database: {}", e))
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| Error::Upstream(format!("corrupt timestamp: {}", ts)))
}

fn parse_metadata<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::Upstream(format!("corrupt metadata_json: {}", e)))
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let doc_type: String = row.get("doc_type");
    let metadata_json: String = row.get("metadata_json");
    let is_active: bool = row.get("is_active");
    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        doc_type: doc_type
            .parse::<DocType>()
            .map_err(|e| Error::Upstream(format!("corrupt documents row: {}", e)))?,
        metadata: parse_metadata(&metadata_json)?,
        version: row.get("version"),
        status: DocumentStatus::from_active_flag(is_active),
        created_at: from_ts(row.get("created_at"))?,
        updated_at: from_ts(row.get("updated_at"))?,
    })
}

fn row_to_chunk(row: &SqliteRow) -> Result<ChunkRecord> {
    let blob: Vec<u8> = row.get("embedding");
    let metadata_json: String = row.get("metadata_json");
    Ok(ChunkRecord {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        token_count: row.get("token_count"),
        hash: row.get("hash"),
        embedding: blob_to_vec(&blob),
        metadata: parse_metadata::<DocumentMetadata>(&metadata_json)?,
    })
}

fn row_to_suggestion_log(row: &SqliteRow) -> Result<SuggestionLogEntry> {
    let metadata_json: String = row.get("metadata_json");
    Ok(SuggestionLogEntry {
        id: row.get("id"),
        ticket_id: row.get("ticket_id"),
        user_id: row.get("user_id"),
        original_suggestion: row.get("original_suggestion"),
        final_message: row.get("final_message"),
        was_modified: row.get("was_modified"),
        was_used: row.get("was_used"),
        metadata: parse_metadata(&metadata_json)?,
        created_at: from_ts(row.get("created_at"))?,
    })
}

const DOCUMENT_COLUMNS: &str =
    "id, title, content, doc_type, metadata_json, version, is_active, created_at, updated_at";

#[async_trait]
impl Store for SqliteStore {
    async fn find_active_by_title(&self, title: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE title = ? AND is_active = 1",
            DOCUMENT_COLUMNS
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn insert_version(
        &self,
        draft: &DocumentDraft,
        version: i64,
        supersedes: Option<&str>,
    ) -> Result<Document> {
        let ts = Utc::now().timestamp();
        let now = from_ts(ts)?;
        let metadata_json = serde_json::to_string(&draft.metadata)?;
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(old_id) = supersedes {
            let updated = sqlx::query(
                "UPDATE documents SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
            )
            .bind(ts)
            .bind(old_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if updated.rows_affected() != 1 {
                return Err(Error::Upstream(format!(
                    "document {} is no longer the active version of '{}'",
                    old_id, draft.title
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, doc_type, metadata_json,
                                   version, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.doc_type.as_str())
        .bind(&metadata_json)
        .bind(version)
        .bind(ts)
        .bind(ts)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err(e).context(format!("inserting '{}' v{}", draft.title, version)))?;

        tx.commit().await.map_err(db_err)?;

        Ok(Document {
            id,
            title: draft.title.clone(),
            content: draft.content.clone(),
            doc_type: draft.doc_type,
            metadata: draft.metadata.clone(),
            version,
            status: DocumentStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM documents
            WHERE (? = 0 OR is_active = 1)
              AND (? IS NULL OR doc_type = ?)
            ORDER BY title ASC, version ASC
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(filter.active_only)
        .bind(filter.doc_type.map(|t| t.as_str()))
        .bind(filter.doc_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_document).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(deleted.rows_affected())
    }

    async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<()> {
        let metadata_json = serde_json::to_string(&chunk.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO document_chunks (id, document_id, chunk_index, content,
                                         token_count, hash, embedding, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(chunk.token_count)
        .bind(&chunk.hash)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(&metadata_json)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, token_count, hash,
                   embedding, metadata_json
            FROM document_chunks
            WHERE document_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn match_chunks(&self, query: &MatchQuery<'_>) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.document_id, c.chunk_index, c.content, c.embedding
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.is_active = 1
              AND (? IS NULL OR c.document_id = ?)
            "#,
        )
        .bind(query.document_id)
        .bind(query.document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut scored: Vec<(f64, String, i64, String)> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query.embedding, &blob_to_vec(&blob)) as f64;
                (similarity >= query.threshold).then(|| {
                    (
                        similarity,
                        row.get::<String, _>("document_id"),
                        row.get::<i64, _>("chunk_index"),
                        row.get::<String, _>("content"),
                    )
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        scored.truncate(query.limit);

        Ok(scored
            .into_iter()
            .map(|(similarity, document_id, _, content)| RetrievedChunk {
                content,
                similarity,
                document_id,
            })
            .collect())
    }

    async fn count_chunks(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn count_documents_by_type(&self) -> Result<Vec<(DocType, i64)>> {
        let rows = sqlx::query(
            "SELECT doc_type, COUNT(*) AS n FROM documents WHERE is_active = 1 GROUP BY doc_type ORDER BY doc_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let doc_type: String = row.get("doc_type");
                let n: i64 = row.get("n");
                doc_type
                    .parse::<DocType>()
                    .map(|t| (t, n))
                    .map_err(|e| Error::Upstream(format!("corrupt documents row: {}", e)))
            })
            .collect()
    }

    async fn insert_suggestion_log(&self, entry: &SuggestionLogEntry) -> Result<()> {
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO suggestions_log (id, ticket_id, user_id, original_suggestion,
                                         final_message, was_modified, was_used,
                                         metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.ticket_id)
        .bind(&entry.user_id)
        .bind(&entry.original_suggestion)
        .bind(&entry.final_message)
        .bind(entry.was_modified)
        .bind(entry.was_used)
        .bind(&metadata_json)
        .bind(entry.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_suggestion_logs(&self, ticket_id: &str) -> Result<Vec<SuggestionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, ticket_id, user_id, original_suggestion, final_message,
                   was_modified, was_used, metadata_json, created_at
            FROM suggestions_log
            WHERE ticket_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_suggestion_log).collect()
    }
}
