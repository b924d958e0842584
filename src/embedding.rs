//! Embedding provider clients.
//!
//! Concrete [`Embedder`] implementations:
//! - **[`DisabledEmbedder`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings` with retry and backoff.
//! - **[`OllamaEmbedder`]**: `POST /api/embed` on a local Ollama instance.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Exhausted retries and non-retryable statuses surface as
//! [`Error::Upstream`]; a missing credential is [`Error::Configuration`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use deskrag_core::embedding::Embedder;
use deskrag_core::error::{Error, Result};

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Retry policy for provider HTTP calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// First backoff step; doubles per attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn none() -> Self {
        Self::new(0)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// POST `body` as JSON and return the parsed JSON response, retrying on
/// 429/5xx and network errors according to `policy`.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    policy: RetryPolicy,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            warn!(label, attempt, delay_ms = delay.as_millis() as u64, "retrying provider call");
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        if let Some(key) = bearer {
            req = req.bearer_auth(key);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| Error::Upstream(format!("{} response: {}", label, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::Upstream(format!("{} API error {}: {}", label, status, body_text));

                // 429 and 5xx are retried
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(Error::Upstream(format!("{} request failed: {}", label, e)));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Upstream(format!("{} failed after retries", label))))
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(Error::upstream)
}

/// Read a provider credential from the environment.
pub(crate) fn api_key(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::Configuration(format!(
            "{} environment variable not set",
            env_var
        ))),
    }
}

fn check_dims(vec: Vec<f32>, dims: usize) -> Result<Vec<f32>> {
    if vec.len() != dims {
        return Err(Error::Upstream(format!(
            "embedding has {} dimensions, expected {}",
            vec.len(),
            dims
        )));
    }
    Ok(vec)
}

fn parse_vector(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    let arr = value
        .as_array()
        .ok_or_else(|| Error::Upstream(format!("Invalid {} response: embedding is not an array", what)))?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::Upstream(format!("Invalid {} response: non-numeric value", what)))
        })
        .collect()
}

// ============ Disabled ============

/// Embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Configuration(
            "embedding provider is disabled; set [embedding] provider in the config".into(),
        ))
    }
}

// ============ OpenAI ============

/// OpenAI embeddings client.
///
/// The API key is read once at construction from `embedding.api_key_env`
/// (default `OPENAI_API_KEY`).
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Configuration("embedding.model required for OpenAI provider".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Configuration("embedding.dims required for OpenAI provider".into()))?;
        let api_key = api_key(&config.api_key_env)?;
        let base = config.url.as_deref().unwrap_or(OPENAI_URL).trim_end_matches('/');

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{}/v1/embeddings", base),
            api_key,
            model,
            dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| Error::Upstream("Invalid OpenAI response: missing data array".into()))?;
    let embedding = first
        .get("embedding")
        .ok_or_else(|| Error::Upstream("Invalid OpenAI response: missing embedding".into()))?;
    parse_vector(embedding, "OpenAI")
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let json = post_json(&self.client, &self.url, Some(&self.api_key), &body, self.retry, "OpenAI").await?;
        check_dims(parse_openai_response(&json)?, self.dims)
    }
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance
/// (e.g. after `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Configuration("embedding.model required for Ollama provider".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Configuration("embedding.dims required for Ollama provider".into()))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_URL).trim_end_matches('/');

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{}/api/embed", base),
            model,
            dims,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| Error::Upstream("Invalid Ollama response: missing embeddings array".into()))?;
    parse_vector(first, "Ollama")
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = post_json(&self.client, &self.url, None, &body, self.retry, "Ollama").await?;
        check_dims(parse_ollama_response(&json)?, self.dims)
    }
}

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => Err(Error::Configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_config(env: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "openai".into(),
            model: Some("text-embedding-ada-002".into()),
            dims: Some(3),
            api_key_env: env.into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = OpenAIEmbedder::new(&openai_config("DESKRAG_TEST_UNSET_KEY")).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn disabled_is_the_default_provider() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(9), Duration::from_secs(32));
    }

    #[test]
    fn parses_provider_payloads() {
        let openai = serde_json::json!({"data": [{"embedding": [0.5, -1.0, 2.0], "index": 0}]});
        assert_eq!(parse_openai_response(&openai).unwrap(), vec![0.5, -1.0, 2.0]);

        let ollama = serde_json::json!({"embeddings": [[1.0, 0.0]]});
        assert_eq!(parse_ollama_response(&ollama).unwrap(), vec![1.0, 0.0]);

        let bad = serde_json::json!({"data": []});
        assert!(matches!(parse_openai_response(&bad), Err(Error::Upstream(_))));
    }

    #[test]
    fn dimension_mismatch_is_upstream() {
        assert!(check_dims(vec![1.0, 2.0], 2).is_ok());
        assert!(matches!(check_dims(vec![1.0], 2), Err(Error::Upstream(_))));
    }
}
