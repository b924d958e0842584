//! Bulk loading of knowledge-base articles from disk.
//!
//! `deskrag import <dir>` walks a directory for `.md` and `.txt` files and
//! feeds them through
//! [`crate::processor::DocumentProcessor::batch_process_documents`]. Each
//! file becomes one document titled after its file stem; importing the
//! same file again produces a new version of that title.

use anyhow::{bail, Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use deskrag_core::models::{DocType, DocumentDraft, DocumentMetadata};

use crate::config::Config;
use crate::processor::BatchOptions;
use crate::progress::ProgressMode;
use crate::server::AppState;

const EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Collect importable files under `root`, sorted by path.
pub fn scan_directory(root: &Path, doc_type: DocType) -> Result<Vec<DocumentDraft>> {
    if !root.is_dir() {
        bail!("import root is not a directory: {}", root.display());
    }

    let mut drafts = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        drafts.push(file_to_draft(path, &relative.to_string_lossy(), doc_type)?);
    }
    Ok(drafts)
}

fn file_to_draft(path: &Path, relative_path: &str, doc_type: DocType) -> Result<DocumentDraft> {
    let content = std::fs::read_to_string(path)?;
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['-', '_'], " "))
        .unwrap_or_else(|| relative_path.to_string());

    let mut metadata = DocumentMetadata::default();
    metadata
        .extra
        .insert("source_path".into(), serde_json::json!(relative_path));

    Ok(DocumentDraft {
        title,
        content,
        doc_type,
        metadata,
    })
}

/// Import a directory. Returns the number of failed documents.
pub async fn run_import(
    config: &Config,
    root: &Path,
    doc_type: DocType,
    concurrency: Option<usize>,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<usize> {
    let drafts = scan_directory(root, doc_type)?;
    if dry_run {
        println!("{} files would be imported as {}:", drafts.len(), doc_type);
        for d in &drafts {
            println!("  {}  ({} bytes)", d.title, d.content.len());
        }
        return Ok(0);
    }

    let state = AppState::from_config(config).await?;
    let total = drafts.len();
    let outcomes = state
        .processor
        .batch_process_documents(
            drafts,
            BatchOptions {
                concurrency,
                on_progress: Some(progress.callback()),
            },
        )
        .await;

    let mut failed = 0;
    for (title, outcome) in &outcomes {
        if !outcome.success {
            failed += 1;
            eprintln!(
                "failed: {}: {}",
                title,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!("imported {} of {} documents", total - failed, total);
    Ok(failed)
}

/// Add one file as a document and print its id.
pub async fn run_add(
    config: &Config,
    path: &Path,
    title: Option<String>,
    doc_type: DocType,
    metadata_json: Option<&str>,
) -> Result<()> {
    let mut draft = file_to_draft(path, &path.to_string_lossy(), doc_type)?;
    if let Some(title) = title {
        draft.title = title;
    }
    if let Some(json) = metadata_json {
        let extra: DocumentMetadata = serde_json::from_str(json)
            .with_context(|| format!("invalid --metadata JSON: {}", json))?;
        draft.metadata = draft.metadata.merge(&extra);
    }
    let state = AppState::from_config(config).await?;
    let id = state.processor.process_document(draft).await?;
    println!("{}", id);
    Ok(())
}

/// Rebuild chunks for every active document. Returns the failure count.
pub async fn run_reprocess(
    config: &Config,
    doc_type: Option<DocType>,
    progress: ProgressMode,
) -> Result<usize> {
    let state = AppState::from_config(config).await?;
    let outcomes = state
        .processor
        .reprocess_all_documents(doc_type, Some(progress.callback()))
        .await?;
    let failed = outcomes.values().filter(|o| !o.success).count();
    println!(
        "reprocessed {} of {} documents",
        outcomes.len() - failed,
        outcomes.len()
    );
    Ok(failed)
}
