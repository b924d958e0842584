//! Chat-completion provider clients.
//!
//! [`OpenAIChat`] calls `POST /v1/chat/completions` once per request; the
//! services above it never retry completions.

use async_trait::async_trait;
use std::sync::Arc;

use deskrag_core::completion::{ChatRequest, ChatResponse, CompletionProvider, TokenUsage};
use deskrag_core::error::{Error, Result};

use crate::config::CompletionConfig;
use crate::embedding::{api_key, http_client, post_json, RetryPolicy};

const OPENAI_URL: &str = "https://api.openai.com";

/// Completion provider used when `completion.provider = "disabled"`.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionProvider for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _request: &ChatRequest) -> Result<String> {
        Err(Error::Configuration(
            "completion provider is disabled; set [completion] provider in the config".into(),
        ))
    }
}

pub struct OpenAIChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAIChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = api_key(&config.api_key_env)?;
        let base = config.url.as_deref().unwrap_or(OPENAI_URL).trim_end_matches('/');
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{}/v1/chat/completions", base),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": request.temperature,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });
        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<ChatResponse> {
    let text = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .map(|choice| {
            choice
                .pointer("/message/content")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string()
        })
        .ok_or_else(|| Error::Upstream("Invalid OpenAI response: missing choices".into()))?;
    let usage = json
        .get("usage")
        .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());
    Ok(ChatResponse { text, usage })
}

#[async_trait]
impl CompletionProvider for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        Ok(self.complete_with_usage(request).await?.text)
    }

    async fn complete_with_usage(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let json = post_json(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &self.body(request),
            RetryPolicy::none(),
            "OpenAI chat",
        )
        .await?;
        parse_chat_response(&json)
    }
}

pub fn create_completion(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => Err(Error::Configuration(format!(
            "Unknown completion provider: {}",
            other
        ))),
    }
}
