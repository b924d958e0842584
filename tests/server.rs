mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use common::{ADMIN_TOKEN, ECHO_USAGE, WORKER_TOKEN};
use deskrag::server::AppState;

struct TestServer {
    base: String,
    client: reqwest::Client,
    state: AppState,
    _tmp: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let state = common::sqlite_state(tmp.path()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = deskrag::server::router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            state,
            _tmp: tmp,
        }
    }

    async fn action(&self, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(format!("{}/api/rag", self.base)).json(&body);
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn add(&self, title: &str, content: &str, doc_type: &str) -> String {
        let (status, body) = self
            .action(
                Some(ADMIN_TOKEN),
                json!({
                    "action": "addDocument",
                    "document": {"title": title, "content": content, "doc_type": doc_type}
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start().await;
    let body: Value = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn add_document_requires_admin() {
    let server = TestServer::start().await;
    let body = json!({
        "action": "addDocument",
        "document": {"title": "Refunds", "content": "Refund text.", "doc_type": "policy"}
    });

    let (status, err) = server.action(None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"]["code"], "unauthorized");

    let (status, err) = server.action(Some(WORKER_TOKEN), body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"]["code"], "forbidden");

    let (status, ok) = server.action(Some(ADMIN_TOKEN), body).await;
    assert_eq!(status, StatusCode::OK);
    let id = ok["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn query_answers_from_matching_chunks() {
    let server = TestServer::start().await;
    let refund_id = server
        .add(
            "Refund Policy",
            "Refunds are issued within 30 days of purchase.",
            "policy",
        )
        .await;
    server
        .add("Password Reset", "Reset your password from the login page.", "help_article")
        .await;

    let (status, body) = server
        .action(
            Some(WORKER_TOKEN),
            json!({"action": "query", "query": "How long does a refund take?"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let chunks = body["relevantChunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["documentId"], refund_id.as_str());
    assert!(body["confidence"].as_f64().unwrap() > 0.7);
    assert!(body["answer"].as_str().unwrap().contains("30 days"));
}

#[tokio::test]
async fn query_without_matches_short_circuits() {
    let server = TestServer::start().await;
    server
        .add("Password Reset", "Reset your password here.", "help_article")
        .await;

    let (status, body) = server
        .action(
            Some(WORKER_TOKEN),
            json!({"action": "query", "query": "What is the shipping cost?"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["answer"],
        "I couldn't find any relevant information to answer your question."
    );
    assert_eq!(body["confidence"], 0.0);
    assert!(body["relevantChunks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn update_then_delete_document() {
    let server = TestServer::start().await;
    let id = server.add("Refunds", "Refund within 30 days.", "policy").await;

    let (status, body) = server
        .action(
            Some(ADMIN_TOKEN),
            json!({"action": "updateDocument", "id": id, "updates": {"content": "Refund within 14 days."}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let new_id = body["id"].as_str().unwrap().to_string();
    assert_ne!(new_id, id);

    let (status, body) = server
        .action(Some(ADMIN_TOKEN), json!({"action": "deleteDocument", "id": new_id}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, stats) = server
        .action(Some(WORKER_TOKEN), json!({"action": "getStats"}))
        .await;
    assert_eq!(stats["totalDocuments"], 0);
    assert_eq!(stats["totalChunks"], 0);
    assert_eq!(stats["docTypeBreakdown"]["policy"], 0);

    let (status, body) = server
        .action(Some(ADMIN_TOKEN), json!({"action": "deleteDocument", "id": new_id}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn process_document_rebuilds_chunks() {
    let server = TestServer::start().await;
    let id = server.add("Refunds", "Refund within 30 days.", "policy").await;

    let (status, body) = server
        .action(Some(ADMIN_TOKEN), json!({"action": "processDocument", "documentId": id}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = server
        .action(
            Some(ADMIN_TOKEN),
            json!({"action": "processDocument", "documentId": "missing"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn suggest_reply_uses_ticket_and_references() {
    let server = TestServer::start().await;
    server
        .add("Refunds", "Refunds are issued within 30 days.", "policy")
        .await;

    let (status, body) = server
        .action(
            Some(WORKER_TOKEN),
            json!({
                "action": "suggestReply",
                "ticketData": {
                    "title": "Refund request",
                    "description": "I want a refund for order 42",
                    "customerEmail": "pat@example.com"
                },
                "style": {"tone": "friendly"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let suggestion = body["suggestion"].as_str().unwrap();
    assert!(suggestion.contains("friendly, concise"));
    assert!(suggestion.contains("Refunds are issued within 30 days."));
    assert_eq!(body["model"], "echo");
    assert_eq!(body["tokensUsed"], ECHO_USAGE.total_tokens);
    assert!(body["cost"].as_f64().unwrap() > 0.0);

    let (status, _) = server
        .action(
            Some(WORKER_TOKEN),
            json!({"action": "suggestReply", "ticketData": {"title": "", "description": ""}}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn log_suggestion_records_what_the_agent_sent() {
    let server = TestServer::start().await;
    let entry = json!({
        "action": "logSuggestion",
        "ticketId": "t-42",
        "originalSuggestion": "We will refund you within 30 days.",
        "finalMessage": "We will refund you within 14 days.",
        "wasModified": true,
        "wasUsed": true,
        "metadata": {"tone": "friendly"}
    });

    let (status, _) = server.action(None, entry.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server.action(Some(WORKER_TOKEN), entry).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);

    let logs = server.state.suggestions.suggestion_logs("t-42").await.unwrap();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.id, body["id"].as_str().unwrap());
    assert_eq!(log.user_id, "bob");
    assert_eq!(log.original_suggestion, "We will refund you within 30 days.");
    assert_eq!(
        log.final_message.as_deref(),
        Some("We will refund you within 14 days.")
    );
    assert!(log.was_modified);
    assert!(log.was_used);
    assert_eq!(log.metadata["tone"], "friendly");

    let (status, _) = server
        .action(
            Some(WORKER_TOKEN),
            json!({"action": "logSuggestion", "ticketId": "t-42"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server.action(Some(ADMIN_TOKEN), json!({"nope": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    // Unknown actions fail before the session check.
    let (status, _) = server.action(None, json!({"action": "dropTables"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .action(Some(WORKER_TOKEN), json!({"action": "query", "query": "  "}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .action(
            Some(ADMIN_TOKEN),
            json!({
                "action": "addDocument",
                "document": {"title": "X", "content": "Y", "doc_type": "memo"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .action(
            Some(WORKER_TOKEN),
            json!({"action": "query", "query": "refund", "similarityThreshold": 3.0}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn other_methods_get_405() {
    let server = TestServer::start().await;
    let resp = server
        .client
        .get(format!("{}/api/rag", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "method_not_allowed");
}
