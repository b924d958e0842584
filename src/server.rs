//! HTTP API for the knowledge base.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/rag` | Action dispatch on the body's `action` field |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Any other method on `/api/rag` is answered with 405.
//!
//! # Actions
//!
//! | action | fields | role | response |
//! |--------|--------|------|----------|
//! | `getStats` | none | any | `{totalDocuments, totalChunks, averageChunksPerDoc, docTypeBreakdown}` |
//! | `query` | `query`, optional `maxChunks`, `similarityThreshold`, `temperature`, `documentId` | any | `{answer, relevantChunks, confidence}` |
//! | `suggestReply` | `ticketData`, optional `style` | any | `{suggestion, model, tokensUsed, cost, references}` |
//! | `logSuggestion` | `ticketId`, `originalSuggestion`, optional `finalMessage`, `wasModified`, `wasUsed`, `metadata` | any | `{success, id}` |
//! | `addDocument` | `document {title, content, doc_type, metadata?}` | admin | `{id}` |
//! | `updateDocument` | `id`, `updates` | admin | `{success, id}` |
//! | `deleteDocument` | `id` | admin | `{success}` |
//! | `processDocument` | `documentId` | admin | `{success}` |
//!
//! Requests are checked in this order: body shape and action name (400),
//! session (401), role (403), per-action fields (400).
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `method_not_allowed` (405), `configuration` (500),
//! `upstream` (500).

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use deskrag_core::error::{Error, Result};
use deskrag_core::models::{DocumentDraft, DocumentUpdate, SuggestionFeedback};
use deskrag_core::rag::RagService;
use deskrag_core::store::Store;

use crate::auth::{require_admin, require_user, AuthProvider, TokenAuth};
use crate::completion::create_completion;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::processor::{DocumentProcessor, ProcessingConfig};
use crate::sqlite_store::SqliteStore;
use crate::suggest::{SuggestionService, SuggestionStyle, TicketContext};
use crate::tokenizer::build_tokenizer;

/// Services shared by every handler. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<DocumentProcessor>,
    pub rag: Arc<RagService>,
    pub suggestions: Arc<SuggestionService>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// Wire the SQLite store, provider clients and services from config.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

        let embedder = create_embedder(&config.embedding)?;
        let completion = create_completion(&config.completion)?;
        let tokenizer = build_tokenizer(&config.chunking)?;

        let processor = Arc::new(DocumentProcessor::new(
            store.clone(),
            embedder.clone(),
            tokenizer,
            ProcessingConfig::from_config(config),
        ));
        let rag = Arc::new(
            RagService::new(store.clone(), embedder, completion)
                .with_defaults(config.query_options()),
        );
        Ok(Self {
            processor,
            suggestions: Arc::new(SuggestionService::new(rag.clone(), store)),
            rag,
            auth: Arc::new(TokenAuth::new(&config.auth.tokens)),
        })
    }
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/rag",
            post(handle_action).fallback(handle_method_not_allowed),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "deskrag API listening");
    println!("deskrag API listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_method_not_allowed() -> AppError {
    AppError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        code: "method_not_allowed".to_string(),
        message: "only POST is supported on /api/rag".to_string(),
    }
}

// ============ POST /api/rag ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    GetStats,
    Query,
    SuggestReply,
    LogSuggestion,
    AddDocument,
    UpdateDocument,
    DeleteDocument,
    ProcessDocument,
}

impl Action {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "getStats" => Ok(Action::GetStats),
            "query" => Ok(Action::Query),
            "suggestReply" => Ok(Action::SuggestReply),
            "logSuggestion" => Ok(Action::LogSuggestion),
            "addDocument" => Ok(Action::AddDocument),
            "updateDocument" => Ok(Action::UpdateDocument),
            "deleteDocument" => Ok(Action::DeleteDocument),
            "processDocument" => Ok(Action::ProcessDocument),
            other => Err(Error::Validation(format!("unknown action '{}'", other))),
        }
    }

    fn requires_admin(self) -> bool {
        matches!(
            self,
            Action::AddDocument
                | Action::UpdateDocument
                | Action::DeleteDocument
                | Action::ProcessDocument
        )
    }
}

/// Required field `name` of the request body.
fn field<T: DeserializeOwned>(body: &Value, name: &str) -> Result<T> {
    let value = body
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::Validation(format!("missing field '{}'", name)))?;
    serde_json::from_value(value.clone())
        .map_err(|e| Error::Validation(format!("invalid field '{}': {}", name, e)))
}

/// Optional field `name`; `null` counts as absent.
fn optional_field<T: DeserializeOwned>(body: &Value, name: &str) -> Result<Option<T>> {
    match body.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => field(body, name).map(Some),
    }
}

fn non_empty(value: String, name: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", name)));
    }
    Ok(value)
}

async fn handle_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<Value>, AppError> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| Error::Validation(format!("request body must be JSON: {}", e)))?;
    let name = body
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("missing field 'action'".into()))?;
    let action = Action::parse(name)?;

    let user = if action.requires_admin() {
        require_admin(state.auth.as_ref(), &headers).await?
    } else {
        require_user(state.auth.as_ref(), &headers).await?
    };
    info!(action = name, user = %user.id, "api action");

    dispatch(&state, action, &user.id, &body).await.map(Json).map_err(|e| {
        warn!(action = name, error = %e, "api action failed");
        AppError::from(e)
    })
}

async fn dispatch(state: &AppState, action: Action, user_id: &str, body: &Value) -> Result<Value> {
    match action {
        Action::GetStats => {
            let stats = state.processor.get_processing_stats().await?;
            Ok(serde_json::to_value(stats)?)
        }
        Action::Query => {
            let question = non_empty(field::<String>(body, "query")?, "query")?;
            let mut opts = state.rag.default_options();
            if let Some(n) = optional_field::<usize>(body, "maxChunks")? {
                opts.max_chunks = n;
            }
            if let Some(t) = optional_field::<f64>(body, "similarityThreshold")? {
                opts.similarity_threshold = t;
            }
            if let Some(t) = optional_field::<f32>(body, "temperature")? {
                opts.temperature = t;
            }
            opts.document_id = optional_field::<String>(body, "documentId")?;

            let result = state.rag.query(&question, &opts).await?;
            Ok(serde_json::to_value(result)?)
        }
        Action::SuggestReply => {
            let ticket: TicketContext = field(body, "ticketData")?;
            let style: SuggestionStyle = optional_field(body, "style")?.unwrap_or_default();
            let suggestion = state.suggestions.suggest_reply(&ticket, style).await?;
            Ok(serde_json::to_value(suggestion)?)
        }
        Action::LogSuggestion => {
            let feedback: SuggestionFeedback = serde_json::from_value(body.clone())
                .map_err(|e| Error::Validation(format!("invalid suggestion log: {}", e)))?;
            let entry = state.suggestions.log_suggestion(user_id, feedback).await?;
            Ok(json!({ "success": true, "id": entry.id }))
        }
        Action::AddDocument => {
            let draft: DocumentDraft = field(body, "document")?;
            let id = state.processor.process_document(draft).await?;
            Ok(json!({ "id": id }))
        }
        Action::UpdateDocument => {
            let id = non_empty(field::<String>(body, "id")?, "id")?;
            let updates: DocumentUpdate = field(body, "updates")?;
            let new_id = state.processor.update_document(&id, &updates).await?;
            Ok(json!({ "success": true, "id": new_id }))
        }
        Action::DeleteDocument => {
            let id = non_empty(field::<String>(body, "id")?, "id")?;
            state.processor.delete_document(&id).await?;
            Ok(json!({ "success": true }))
        }
        Action::ProcessDocument => {
            let id = non_empty(field::<String>(body, "documentId")?, "documentId")?;
            state.processor.reprocess_document(&id).await?;
            Ok(json!({ "success": true }))
        }
    }
}
