//! `deskrag query`: ask the knowledge base a question from the terminal.

use anyhow::Result;

use crate::config::Config;
use crate::server::AppState;

pub async fn run_query(
    config: &Config,
    question: &str,
    max_chunks: Option<usize>,
    threshold: Option<f64>,
    document_id: Option<String>,
    json: bool,
) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let mut opts = state.rag.default_options();
    if let Some(n) = max_chunks {
        opts.max_chunks = n;
    }
    if let Some(t) = threshold {
        opts.similarity_threshold = t;
    }
    opts.document_id = document_id;

    let result = state.rag.query(question, &opts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.answer);
    if !result.relevant_chunks.is_empty() {
        println!();
        println!("Sources (confidence {:.2}):", result.confidence);
        for (i, chunk) in result.relevant_chunks.iter().enumerate() {
            let preview: String = chunk.content.chars().take(80).collect();
            println!(
                "  {}. [{:.3}] {}  {}",
                i + 1,
                chunk.similarity,
                chunk.document_id,
                preview.replace('\n', " ")
            );
        }
    }
    Ok(())
}
