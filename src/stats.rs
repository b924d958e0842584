//! Knowledge-base statistics.
//!
//! [`collect`] aggregates active documents and their chunks through the
//! [`Store`] trait. It backs the `getStats` API action and `deskrag stats`.

use anyhow::Result as AnyResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use deskrag_core::error::Result;
use deskrag_core::models::DocType;
use deskrag_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub average_chunks_per_doc: f64,
    /// Every known type, 0 when absent.
    pub doc_type_breakdown: BTreeMap<DocType, i64>,
}

/// Read-only aggregation over active documents.
pub async fn collect(store: &dyn Store) -> Result<ProcessingStats> {
    let mut doc_type_breakdown: BTreeMap<DocType, i64> =
        DocType::ALL.iter().map(|t| (*t, 0)).collect();
    for (doc_type, n) in store.count_documents_by_type().await? {
        doc_type_breakdown.insert(doc_type, n);
    }

    let total_documents: i64 = doc_type_breakdown.values().sum();
    let total_chunks = store.count_chunks().await?;
    let average_chunks_per_doc = if total_documents > 0 {
        total_chunks as f64 / total_documents as f64
    } else {
        0.0
    };

    Ok(ProcessingStats {
        total_documents,
        total_chunks,
        average_chunks_per_doc,
        doc_type_breakdown,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> AnyResult<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let stats = collect(store.as_ref()).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("deskrag knowledge base");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.total_documents);
    println!("  Chunks:      {}", stats.total_chunks);
    println!("  Avg chunks:  {:.1}", stats.average_chunks_per_doc);
    println!();
    println!("  By type:");
    for (doc_type, n) in &stats.doc_type_breakdown {
        println!("  {:<16} {:>6}", doc_type.as_str(), n);
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskrag_core::models::DocumentDraft;
    use deskrag_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn empty_store_reports_all_types() {
        let stats = collect(&InMemoryStore::new()).await.unwrap();
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.average_chunks_per_doc, 0.0);
        assert_eq!(stats.doc_type_breakdown.len(), 4);
        assert!(stats.doc_type_breakdown.values().all(|n| *n == 0));
    }

    #[tokio::test]
    async fn counts_active_documents_only() {
        let store = InMemoryStore::new();
        let draft = DocumentDraft::new("Refunds", "v1", DocType::Policy);
        let v1 = store.insert_version(&draft, 1, None).await.unwrap();
        store.insert_version(&draft, 2, Some(&v1.id)).await.unwrap();
        store
            .insert_version(&DocumentDraft::new("Login", "x", DocType::Faq), 1, None)
            .await
            .unwrap();

        let stats = collect(&store).await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.doc_type_breakdown[&DocType::Policy], 1);
        assert_eq!(stats.doc_type_breakdown[&DocType::ApiDoc], 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["docTypeBreakdown"]["help_article"], 0);
        assert!(json.get("averageChunksPerDoc").is_some());
    }

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
