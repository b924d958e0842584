//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to the
//! defaults below.
//!
//! ```toml
//! [db]
//! path = "./data/deskrag.sqlite"
//!
//! [chunking]
//! max_tokens = 500
//! overlap_tokens = 50
//!
//! [processing]
//! embed_concurrency = 3
//! batch_concurrency = 3
//! batch_delay_ms = 1000
//!
//! [retrieval]
//! max_chunks = 5
//! similarity_threshold = 0.7
//! temperature = 0.7
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-ada-002"
//! dims = 1536
//!
//! [completion]
//! provider = "openai"
//! model = "gpt-4-turbo-preview"
//!
//! [server]
//! bind = "127.0.0.1:7331"
//!
//! [[auth.tokens]]
//! token = "admin-secret"
//! user_id = "alice"
//! role = "admin"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use deskrag_core::rag::QueryOptions;

use crate::auth::Role;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub processing: ProcessingSection,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    /// `"regex"` or `"huggingface"` (needs the `hf-tokenizer` feature).
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    /// Path to a `tokenizer.json` when `tokenizer = "huggingface"`.
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            tokenizer: default_tokenizer(),
            tokenizer_path: None,
        }
    }
}

fn default_max_tokens() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}
fn default_tokenizer() -> String {
    "regex".to_string()
}

/// `[processing]`: concurrency knobs for the document processor.
#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingSection {
    /// Chunks of one document embedded in parallel.
    #[serde(default = "default_concurrency")]
    pub embed_concurrency: usize,
    /// Documents of one batch processed in parallel.
    #[serde(default = "default_concurrency")]
    pub batch_concurrency: usize,
    /// Pause between consecutive groups of `batch_concurrency` documents.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            embed_concurrency: default_concurrency(),
            batch_concurrency: default_concurrency(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

fn default_concurrency() -> usize {
    3
}
fn default_batch_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_chunks: default_max_chunks(),
            similarity_threshold: default_similarity_threshold(),
            temperature: default_temperature(),
        }
    }
}

fn default_max_chunks() -> usize {
    5
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"`, `"openai"` or `"ollama"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_completion_model(),
            url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_completion_timeout_secs(),
            max_tokens: None,
        }
    }
}

fn default_completion_model() -> String {
    "gpt-4-turbo-preview".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// One static bearer token and the user it authenticates.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

impl Config {
    /// Retrieval defaults for the query service.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            max_chunks: self.retrieval.max_chunks,
            similarity_threshold: self.retrieval.similarity_threshold,
            temperature: self.retrieval.temperature,
            document_id: None,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML config string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        anyhow::bail!(
            "chunking.overlap_tokens ({}) must be smaller than chunking.max_tokens ({})",
            config.chunking.overlap_tokens,
            config.chunking.max_tokens
        );
    }
    match config.chunking.tokenizer.as_str() {
        "regex" => {}
        "huggingface" => {
            if config.chunking.tokenizer_path.is_none() {
                anyhow::bail!("chunking.tokenizer_path is required when tokenizer is 'huggingface'");
            }
        }
        other => anyhow::bail!(
            "Unknown tokenizer: '{}'. Must be regex or huggingface.",
            other
        ),
    }

    // Validate processing
    if config.processing.embed_concurrency == 0 || config.processing.batch_concurrency == 0 {
        anyhow::bail!("processing concurrency settings must be >= 1");
    }

    // Validate retrieval
    if config.retrieval.max_chunks < 1 {
        anyhow::bail!("retrieval.max_chunks must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=2.0).contains(&config.retrieval.temperature) {
        anyhow::bail!("retrieval.temperature must be in [0.0, 2.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
