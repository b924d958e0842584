//! Retrieval-augmented question answering over the knowledge base.
//!
//! [`RagService`] embeds a question, pulls the closest chunks of active
//! documents from the [`Store`], and asks the completion provider to
//! answer from that context only.
//!
//! # Query Algorithm
//!
//! 1. Blank question: return the no-match result, no provider calls.
//! 2. Embed the question.
//! 3. `match_chunks` with `max_chunks`, `similarity_threshold` and the
//!    optional document restriction.
//! 4. No chunk qualifies: return [`NO_MATCH_ANSWER`] with confidence 0,
//!    no completion call.
//! 5. Join chunk texts in ranked order (blank-line separated) into the
//!    context block, send [`SYSTEM_PROMPT`] plus [`build_prompt`].
//! 6. `confidence` is the mean similarity of the chunks used.

use std::sync::Arc;

use tracing::{debug, info};

use crate::completion::{ChatRequest, CompletionProvider};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{QueryResult, RetrievedChunk};
use crate::store::{MatchQuery, Store};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the provided context. Only use the information from the context to answer questions. If you cannot answer a question based solely on the context, say so.";

/// Answer returned when no chunk clears the similarity threshold.
pub const NO_MATCH_ANSWER: &str = "I couldn't find any relevant information to answer your question.";

/// Answer used when the provider returns an empty message.
pub const EMPTY_COMPLETION_ANSWER: &str = "I couldn't generate an answer.";

/// Per-query retrieval settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub max_chunks: usize,
    /// Inclusive cosine similarity floor.
    pub similarity_threshold: f64,
    pub temperature: f32,
    pub document_id: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_chunks: 5,
            similarity_threshold: 0.7,
            temperature: 0.7,
            document_id: None,
        }
    }
}

impl QueryOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunks == 0 {
            return Err(Error::Validation("maxChunks must be >= 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Validation(format!(
                "similarityThreshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Validation(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Build the user prompt from ranked chunks.
pub fn build_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Based on the following context, please answer the question. \
         Provide your answer along with citations. After your answer, include a \
         'Citations:' section listing source identifiers (e.g., document IDs or \
         chunk numbers) for the referenced information. If you cannot answer based \
         solely on the context, simply state that.\n\n\
         Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        context, question
    )
}

/// Arithmetic mean of the chunk similarities, 0 for no chunks.
pub fn confidence(chunks: &[RetrievedChunk]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    chunks.iter().map(|c| c.similarity).sum::<f64>() / chunks.len() as f64
}

fn no_match() -> QueryResult {
    QueryResult {
        answer: NO_MATCH_ANSWER.to_string(),
        relevant_chunks: Vec::new(),
        confidence: 0.0,
    }
}

/// Query service. Construct once at startup and share behind an `Arc`.
pub struct RagService {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionProvider>,
    defaults: QueryOptions,
}

impl RagService {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            completion,
            defaults: QueryOptions::default(),
        }
    }

    /// Replace the defaults handed out by [`RagService::default_options`].
    pub fn with_defaults(mut self, defaults: QueryOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn default_options(&self) -> QueryOptions {
        self.defaults.clone()
    }

    pub fn completion(&self) -> &Arc<dyn CompletionProvider> {
        &self.completion
    }

    /// Ranked chunks for `question`, without calling the completion provider.
    pub async fn retrieve(&self, question: &str, opts: &QueryOptions) -> Result<Vec<RetrievedChunk>> {
        opts.validate()?;
        if question.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| e.context("embedding query"))?;

        let chunks = self
            .store
            .match_chunks(&MatchQuery {
                embedding: &embedding,
                limit: opts.max_chunks,
                threshold: opts.similarity_threshold,
                document_id: opts.document_id.as_deref(),
            })
            .await
            .map_err(|e| e.context("searching chunks"))?;

        debug!(
            matches = chunks.len(),
            threshold = opts.similarity_threshold,
            "retrieved chunks"
        );
        Ok(chunks)
    }

    pub async fn query(&self, question: &str, opts: &QueryOptions) -> Result<QueryResult> {
        let chunks = self.retrieve(question, opts).await?;
        if chunks.is_empty() {
            info!("no chunks above threshold, skipping completion");
            return Ok(no_match());
        }

        let request = ChatRequest::new(SYSTEM_PROMPT, build_prompt(question, &chunks), opts.temperature);
        let answer = self
            .completion
            .complete(&request)
            .await
            .map_err(|e| e.context("generating answer"))?;
        let answer = if answer.trim().is_empty() {
            EMPTY_COMPLETION_ANSWER.to_string()
        } else {
            answer
        };

        let confidence = confidence(&chunks);
        info!(
            chunks = chunks.len(),
            confidence,
            model = self.completion.model_name(),
            "answered query"
        );
        Ok(QueryResult {
            answer,
            relevant_chunks: chunks,
            confidence,
        })
    }
}
