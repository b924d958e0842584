//! Reply suggestions for support tickets.
//!
//! Drafts an email reply for a ticket in the requested [`SuggestionStyle`].
//! Knowledge-base chunks relevant to the ticket are appended to the prompt
//! as reference material. What the agent finally sent is recorded through
//! [`SuggestionService::log_suggestion`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use deskrag_core::completion::ChatRequest;
use deskrag_core::error::{Error, Result};
use deskrag_core::models::{RetrievedChunk, SuggestionFeedback, SuggestionLogEntry};
use deskrag_core::rag::RagService;
use deskrag_core::store::Store;

pub const SUGGESTION_SYSTEM_PROMPT: &str = "You are a helpful customer service representative.\n\
Your goal is to provide clear, accurate, and helpful responses to customer inquiries.\n\
Keep responses professional and focused on resolving the customer's issue.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Formal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    #[default]
    Concise,
    Detailed,
}

/// Unknown keys are rejected rather than silently ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuggestionStyle {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub length: Length,
}

impl Tone {
    fn as_str(self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Friendly => "friendly",
            Tone::Formal => "formal",
        }
    }
}

impl Length {
    fn as_str(self) -> &'static str {
        match self {
            Length::Concise => "concise",
            Length::Detailed => "detailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketContext {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub customer_email: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

impl TicketContext {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.description.trim().is_empty() {
            return Err(Error::Validation(
                "Invalid request: Missing required ticket data".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub suggestion: String,
    pub model: String,
    /// Total tokens reported by the provider, 0 when it reports none.
    pub tokens_used: u32,
    /// Estimated USD cost of the completion call.
    pub cost: f64,
    /// Knowledge-base chunks shown to the model.
    pub references: Vec<RetrievedChunk>,
}

/// USD per 1K tokens. Unlisted models are billed at the GPT-4 rate.
const COST_PER_1K_TOKENS: &[(&str, f64)] = &[("gpt-4", 0.03), ("gpt-3.5-turbo", 0.002)];
const DEFAULT_COST_PER_1K: f64 = 0.03;

pub fn estimate_cost(tokens: u32, model: &str) -> f64 {
    let per_1k = COST_PER_1K_TOKENS
        .iter()
        .find(|(name, _)| *name == model)
        .map_or(DEFAULT_COST_PER_1K, |(_, rate)| *rate);
    tokens as f64 / 1000.0 * per_1k
}

/// Build the user prompt for a ticket reply.
pub fn build_suggestion_prompt(
    ticket: &TicketContext,
    style: SuggestionStyle,
    references: &[RetrievedChunk],
) -> String {
    let mut prompt = format!(
        "Please provide a {}, {} response to the following customer ticket:\n\n\
         Title: {}\nDescription: {}\nPriority: {}\nCategory: {}\n\n\
         The response should be appropriate for an email reply to {}.",
        style.tone.as_str(),
        style.length.as_str(),
        ticket.title,
        ticket.description,
        ticket.priority,
        ticket.category.as_deref().unwrap_or("N/A"),
        if ticket.customer_email.is_empty() {
            "the customer"
        } else {
            ticket.customer_email.as_str()
        },
    );
    if !references.is_empty() {
        prompt.push_str(
            "\n\nUse the following knowledge base excerpts where they apply. \
             Do not promise anything they do not support.\n",
        );
        for (i, r) in references.iter().enumerate() {
            let _ = write!(prompt, "\n[{}] {}\n", i + 1, r.content);
        }
    }
    prompt
}

pub struct SuggestionService {
    rag: Arc<RagService>,
    store: Arc<dyn Store>,
    max_tokens: u32,
}

impl SuggestionService {
    pub fn new(rag: Arc<RagService>, store: Arc<dyn Store>) -> Self {
        Self {
            rag,
            store,
            max_tokens: 500,
        }
    }

    pub async fn suggest_reply(&self, ticket: &TicketContext, style: SuggestionStyle) -> Result<Suggestion> {
        ticket.validate()?;
        let opts = self.rag.default_options();

        let question = format!("{}\n{}", ticket.title, ticket.description);
        let references = self
            .rag
            .retrieve(&question, &opts)
            .await
            .map_err(|e| e.context("retrieving references"))?;

        let mut request = ChatRequest::new(
            SUGGESTION_SYSTEM_PROMPT,
            build_suggestion_prompt(ticket, style, &references),
            opts.temperature,
        );
        request.max_tokens = Some(self.max_tokens);

        let completion = self.rag.completion();
        let response = completion
            .complete_with_usage(&request)
            .await
            .map_err(|e| e.context("generating suggestion"))?;
        if response.text.trim().is_empty() {
            return Err(Error::Upstream("No suggestion generated".into()));
        }

        let model = completion.model_name().to_string();
        let tokens_used = response.usage.map_or(0, |u| u.total_tokens);
        info!(
            ticket = %ticket.id,
            references = references.len(),
            tokens_used,
            "suggested reply"
        );
        Ok(Suggestion {
            suggestion: response.text,
            cost: estimate_cost(tokens_used, &model),
            model,
            tokens_used,
            references,
        })
    }

    /// Record what `user_id` did with a suggested reply.
    pub async fn log_suggestion(
        &self,
        user_id: &str,
        feedback: SuggestionFeedback,
    ) -> Result<SuggestionLogEntry> {
        if feedback.ticket_id.trim().is_empty() {
            return Err(Error::Validation("ticketId must not be empty".into()));
        }
        if feedback.original_suggestion.trim().is_empty() {
            return Err(Error::Validation(
                "originalSuggestion must not be empty".into(),
            ));
        }

        let entry = SuggestionLogEntry {
            id: Uuid::new_v4().to_string(),
            ticket_id: feedback.ticket_id,
            user_id: user_id.to_string(),
            original_suggestion: feedback.original_suggestion,
            final_message: feedback.final_message,
            was_modified: feedback.was_modified,
            was_used: feedback.was_used,
            metadata: feedback.metadata,
            created_at: Utc::now(),
        };
        self.store
            .insert_suggestion_log(&entry)
            .await
            .map_err(|e| e.context("logging suggestion"))?;
        info!(
            ticket = %entry.ticket_id,
            user = user_id,
            was_used = entry.was_used,
            "logged suggestion"
        );
        Ok(entry)
    }

    pub async fn suggestion_logs(&self, ticket_id: &str) -> Result<Vec<SuggestionLogEntry>> {
        self.store.list_suggestion_logs(ticket_id).await
    }
}
