mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use deskrag::processor::BatchOptions;
use deskrag::progress::BatchProgressEvent;
use deskrag_core::error::Error;
use deskrag_core::models::{DocType, DocumentDraft, DocumentStatus, DocumentUpdate};
use deskrag_core::store::{DocumentFilter, Store};

const REFUND_POLICY: &str = "Refunds are issued within 30 days of purchase. \
    Contact support with your order number to request a refund.";

#[tokio::test]
async fn versions_increase_and_only_latest_is_active() {
    let tmp = TempDir::new().unwrap();
    let state = common::sqlite_state(tmp.path()).await;
    let p = &state.processor;

    let mut ids = Vec::new();
    for body in ["v1 refund text.", "v2 refund text.", "v3 refund text."] {
        ids.push(
            p.process_document(DocumentDraft::new("Refund Policy", body, DocType::Policy))
                .await
                .unwrap(),
        );
    }

    let store = p.store();
    let all = store
        .list_documents(&DocumentFilter {
            active_only: false,
            doc_type: None,
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    let versions: Vec<i64> = {
        let mut v: Vec<i64> = all.iter().map(|d| d.version).collect();
        v.sort();
        v
    };
    assert_eq!(versions, vec![1, 2, 3]);

    let active = store.find_active_by_title("Refund Policy").await.unwrap().unwrap();
    assert_eq!(active.id, ids[2]);
    assert_eq!(active.version, 3);
    let first = store.get_document(&ids[0]).await.unwrap().unwrap();
    assert_eq!(first.status, DocumentStatus::Superseded);
}

#[tokio::test]
async fn concurrent_writes_to_one_title_get_distinct_versions() {
    let tmp = TempDir::new().unwrap();
    let state = common::sqlite_state(tmp.path()).await;

    let writes = (0..4).map(|i| {
        let p = state.processor.clone();
        tokio::spawn(async move {
            p.process_document(DocumentDraft::new(
                "Shipping FAQ",
                format!("Shipping takes {} days.", i + 2),
                DocType::Faq,
            ))
            .await
        })
    });
    for handle in futures::future::join_all(writes).await {
        handle.unwrap().unwrap();
    }

    let all = state
        .processor
        .store()
        .list_documents(&DocumentFilter {
            active_only: false,
            doc_type: Some(DocType::Faq),
        })
        .await
        .unwrap();
    let versions: HashSet<i64> = all.iter().map(|d| d.version).collect();
    assert_eq!(versions, (1..=4).collect());
    assert_eq!(all.iter().filter(|d| d.status.is_active()).count(), 1);
}

#[tokio::test]
async fn batch_records_each_outcome() {
    let tmp = TempDir::new().unwrap();
    let state = common::sqlite_state(tmp.path()).await;

    let events = Arc::new(Mutex::new(Vec::<BatchProgressEvent>::new()));
    let sink = events.clone();
    let outcomes = state
        .processor
        .batch_process_documents(
            vec![
                DocumentDraft::new("Refunds", REFUND_POLICY, DocType::Policy),
                DocumentDraft::new("Broken", "This one will EXPLODE.", DocType::Faq),
                DocumentDraft::new("Passwords", "Reset your password here.", DocType::HelpArticle),
            ],
            BatchOptions {
                concurrency: Some(2),
                on_progress: Some(Arc::new(move |e: &BatchProgressEvent| {
                    sink.lock().unwrap().push(e.clone())
                })),
            },
        )
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes["Refunds"].success);
    assert!(outcomes["Refunds"].document_id.is_some());
    assert!(outcomes["Passwords"].success);
    let broken = &outcomes["Broken"];
    assert!(!broken.success);
    assert!(broken.error.as_deref().unwrap().contains("chunk 0 of 1"));

    let store = state.processor.store();
    for title in ["Refunds", "Passwords"] {
        let id = outcomes[title].document_id.as_deref().unwrap();
        assert!(!store.list_chunks(id).await.unwrap().is_empty(), "{} has no chunks", title);
    }
    assert!(store.find_active_by_title("Refunds").await.unwrap().is_some());

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    let mut completed: Vec<usize> = events.iter().map(|e| e.completed).collect();
    completed.sort();
    assert_eq!(completed, vec![1, 2, 3]);
    assert!(events.iter().all(|e| e.total == 3));
}

#[tokio::test]
async fn stats_are_stable_and_count_active_documents() {
    let tmp = TempDir::new().unwrap();
    let state = common::sqlite_state(tmp.path()).await;
    let p = &state.processor;

    p.process_document(DocumentDraft::new("Refunds", REFUND_POLICY, DocType::Policy))
        .await
        .unwrap();
    p.process_document(DocumentDraft::new("Refunds", "Refunds take 14 days.", DocType::Policy))
        .await
        .unwrap();
    p.process_document(DocumentDraft::new("API keys", "Rotate api keys yearly.", DocType::ApiDoc))
        .await
        .unwrap();

    let first = p.get_processing_stats().await.unwrap();
    let second = p.get_processing_stats().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.total_documents, 2);
    assert_eq!(first.doc_type_breakdown[&DocType::Policy], 1);
    assert_eq!(first.doc_type_breakdown[&DocType::ApiDoc], 1);
    assert_eq!(first.doc_type_breakdown[&DocType::Faq], 0);
    assert_eq!(
        first.average_chunks_per_doc,
        first.total_chunks as f64 / 2.0
    );
}

#[tokio::test]
async fn update_merges_fields_into_a_new_version() {
    let tmp = TempDir::new().unwrap();
    let state = common::sqlite_state(tmp.path()).await;
    let p = &state.processor;

    let id = p
        .process_document(DocumentDraft::new("Refunds", REFUND_POLICY, DocType::Policy))
        .await
        .unwrap();
    let new_id = p
        .update_document(
            &id,
            &DocumentUpdate {
                content: Some("Refunds are issued within 14 days.".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_ne!(id, new_id);

    let doc = p.store().get_document(&new_id).await.unwrap().unwrap();
    assert_eq!(doc.version, 2);
    assert_eq!(doc.title, "Refunds");
    assert_eq!(doc.doc_type, DocType::Policy);
    assert_eq!(doc.content, "Refunds are issued within 14 days.");

    let err = p.update_document(&id, &DocumentUpdate::default()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = p
        .update_document("no-such-id", &DocumentUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_document_and_chunks() {
    let tmp = TempDir::new().unwrap();
    let state = common::sqlite_state(tmp.path()).await;
    let p = &state.processor;

    let id = p
        .process_document(DocumentDraft::new("Refunds", REFUND_POLICY, DocType::Policy))
        .await
        .unwrap();
    assert!(!p.store().list_chunks(&id).await.unwrap().is_empty());

    p.delete_document(&id).await.unwrap();
    assert!(p.store().get_document(&id).await.unwrap().is_none());
    assert!(p.store().list_chunks(&id).await.unwrap().is_empty());
    assert_eq!(p.get_processing_stats().await.unwrap().total_chunks, 0);

    let err = p.delete_document(&id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn retrieval_ignores_superseded_versions() {
    let tmp = TempDir::new().unwrap();
    let state = common::sqlite_state(tmp.path()).await;
    let p = &state.processor;

    p.process_document(DocumentDraft::new("Refunds", REFUND_POLICY, DocType::Policy))
        .await
        .unwrap();
    let latest = p
        .process_document(DocumentDraft::new("Refunds", "A refund takes 14 days.", DocType::Policy))
        .await
        .unwrap();

    let opts = state.rag.default_options();
    let hits = state.rag.retrieve("refund timing", &opts).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.document_id == latest));
}
