#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use deskrag::auth::TokenAuth;
use deskrag::config::{parse_config, Config};
use deskrag::processor::{DocumentProcessor, ProcessingConfig};
use deskrag::server::AppState;
use deskrag::sqlite_store::SqliteStore;
use deskrag::suggest::SuggestionService;
use deskrag::{db, migrate};
use deskrag_core::completion::{ChatRequest, ChatResponse, CompletionProvider, TokenUsage};
use deskrag_core::embedding::Embedder;
use deskrag_core::error::{Error, Result};
use deskrag_core::rag::RagService;
use deskrag_core::store::Store;
use deskrag_core::tokenizer::RegexTokenizer;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const WORKER_TOKEN: &str = "worker-token";

const KEYWORDS: &[&str] = &["refund", "password", "shipping", "api"];

/// One axis per keyword plus a catch-all, so texts sharing a keyword
/// have similarity 1.0 and unrelated texts 0.0.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    fn dims(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        if lower.contains("explode") {
            return Err(Error::Upstream("embedding provider returned 500".into()));
        }
        let mut v: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
            .collect();
        let other = if v.iter().all(|x| *x == 0.0) { 1.0 } else { 0.0 };
        v.push(other);
        Ok(v)
    }
}

/// Answers with the prompt it was given.
pub struct EchoCompletion;

pub const ECHO_USAGE: TokenUsage = TokenUsage {
    prompt_tokens: 120,
    completion_tokens: 30,
    total_tokens: 150,
};

#[async_trait]
impl CompletionProvider for EchoCompletion {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        Ok(format!("echo: {}", request.user))
    }

    async fn complete_with_usage(&self, request: &ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse {
            text: self.complete(request).await?,
            usage: Some(ECHO_USAGE),
        })
    }
}

pub fn test_config(root: &Path) -> Config {
    let toml = format!(
        r#"[db]
path = "{}/data/deskrag.sqlite"

[chunking]
max_tokens = 40
overlap_tokens = 5

[processing]
embed_concurrency = 2
batch_concurrency = 2
batch_delay_ms = 0

[[auth.tokens]]
token = "{}"
user_id = "alice"
role = "admin"

[[auth.tokens]]
token = "{}"
user_id = "bob"
role = "worker"
"#,
        root.display(),
        ADMIN_TOKEN,
        WORKER_TOKEN
    );
    parse_config(&toml).unwrap()
}

/// App services over a fresh SQLite database with fake providers.
pub async fn sqlite_state(root: &Path) -> AppState {
    let config = test_config(root);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());

    let processor = Arc::new(DocumentProcessor::new(
        store.clone(),
        embedder.clone(),
        Arc::new(RegexTokenizer),
        ProcessingConfig::from_config(&config),
    ));
    let rag = Arc::new(
        RagService::new(store.clone(), embedder, Arc::new(EchoCompletion))
            .with_defaults(config.query_options()),
    );
    AppState {
        processor,
        suggestions: Arc::new(SuggestionService::new(rag.clone(), store)),
        rag,
        auth: Arc::new(TokenAuth::new(&config.auth.tokens)),
    }
}
