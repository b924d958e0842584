//! Chat-completion provider trait.
//!
//! The query service and the reply-suggestion service only need a
//! system prompt plus a user prompt in, text out. The HTTP client for
//! OpenAI lives in the app crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
            max_tokens: None,
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Assistant text plus usage, when the provider reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the assistant message text.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Like [`complete`](CompletionProvider::complete), keeping token usage.
    async fn complete_with_usage(&self, request: &ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse {
            text: self.complete(request).await?,
            usage: None,
        })
    }
}
