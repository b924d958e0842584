//! Token-window text chunker with overlap.
//!
//! Splits document text into [`TextChunk`]s of at most `target_tokens`
//! tokens, preferring to end each chunk on a sentence end or a newline.
//! Adjacent chunks share `overlap_tokens` tokens so retrieval does not
//! lose context at chunk boundaries.
//!
//! # Algorithm
//!
//! 1. Encode the text with the configured [`Tokenizer`].
//! 2. Take a window of `target_tokens` tokens starting at the cursor.
//! 3. Scan backward from the window's end for a break token (`.`, `!`,
//!    `?`, or a newline). The scan stops `overlap_tokens` into the window
//!    so every chunk advances the cursor.
//! 4. Break found: the chunk ends after that token. Otherwise the chunk is
//!    hard-cut at `target_tokens`.
//! 5. The next window starts `overlap_tokens` before the cut.
//! 6. Once the remaining tokens fit in one window they form the last
//!    chunk, however short.
//!
//! # Example
//!
//! ```rust
//! use deskrag_core::chunk::chunk_text;
//! use deskrag_core::tokenizer::RegexTokenizer;
//!
//! let chunks = chunk_text(&RegexTokenizer, "Hello world.", 100, 10).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].content, "Hello world.");
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;

/// One chunk of source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Exact slice of the source text.
    pub content: String,
    pub token_count: usize,
    /// Byte offset of the first token in the source text.
    pub start: usize,
    /// Byte offset one past the last token.
    pub end: usize,
    /// Number of leading tokens shared with the previous chunk.
    pub overlap: usize,
}

/// Split `text` into overlapping token-bounded chunks.
///
/// # Errors
///
/// Returns [`Error::Validation`] when `target_tokens` is zero or
/// `overlap_tokens >= target_tokens`; with such settings the window could
/// never advance.
///
/// # Guarantees
///
/// - Empty text yields no chunks; text shorter than the target yields one.
/// - Every chunk has at most `target_tokens` tokens.
/// - For chunks `i` and `i + 1`, the last `overlap_tokens` tokens of `i`
///   are the first tokens of `i + 1`.
/// - Deterministic for a given tokenizer.
pub fn chunk_text(
    tokenizer: &dyn Tokenizer,
    text: &str,
    target_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<TextChunk>> {
    if target_tokens == 0 {
        return Err(Error::Validation("chunk size must be > 0".into()));
    }
    if overlap_tokens >= target_tokens {
        return Err(Error::Validation(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap_tokens, target_tokens
        )));
    }

    let tokens = tokenizer.encode(text);
    let n = tokens.len();
    let mut chunks = Vec::new();
    if n == 0 {
        return Ok(chunks);
    }

    let make = |from: usize, to: usize, overlap: usize| {
        let start = tokens[from].start;
        let end = tokens[to - 1].end;
        TextChunk {
            content: text[start..end].to_string(),
            token_count: to - from,
            start,
            end,
            overlap,
        }
    };

    let mut cursor = 0;
    let mut overlap = 0;
    loop {
        if n - cursor <= target_tokens {
            chunks.push(make(cursor, n, overlap));
            break;
        }

        let window_end = cursor + target_tokens;
        let cut = (cursor + overlap_tokens..window_end)
            .rev()
            .find(|&i| tokens[i].is_break(text))
            .map(|i| i + 1)
            .unwrap_or(window_end);

        chunks.push(make(cursor, cut, overlap));
        cursor = cut - overlap_tokens;
        overlap = overlap_tokens;
    }

    Ok(chunks)
}

/// SHA-256 of a chunk's content, stored alongside the chunk for staleness
/// checks.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuild the source text from chunks by dropping each chunk's overlap.
pub fn reassemble(chunks: &[TextChunk], source: &str) -> String {
    let mut out = String::new();
    let mut covered = 0;
    for c in chunks {
        if c.start > covered {
            out.push_str(&source[covered..c.start]);
        }
        let from = covered.max(c.start);
        if from < c.end {
            out.push_str(&source[from..c.end]);
        }
        covered = covered.max(c.end);
    }
    out
}
