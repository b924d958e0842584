//! Tokenizer adapter.
//!
//! The chunker only needs two things from a tokenizer: token boundaries
//! (as byte offsets into the source text) and a way to tell whether a
//! token ends a sentence or a line. Decoding is slicing the source text
//! by offsets, so chunk contents are always exact substrings.
//!
//! [`RegexTokenizer`] is the built-in default. It approximates GPT-style
//! pre-tokenization closely enough for budgeting chunk sizes and is fully
//! deterministic. A Hugging Face `tokenizer.json` adapter lives in the app
//! crate behind the `hf-tokenizer` feature.

use once_cell::sync::Lazy;
use regex::Regex;

/// A single token: vocabulary id plus its byte span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub id: u32,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// True when the token closes a sentence or contains a newline, i.e. a
    /// clean place to end a chunk.
    pub fn is_break(&self, source: &str) -> bool {
        let s = self.text(source);
        s.contains('\n') || s.trim_end().ends_with(|c| matches!(c, '.' | '!' | '?'))
    }
}

/// Text to token codec used by the chunker.
pub trait Tokenizer: Send + Sync {
    /// Identifier reported in logs (e.g. `"regex"`, a tokenizer file path).
    fn name(&self) -> &str;

    /// Encode `text` into tokens ordered by position.
    fn encode(&self, text: &str) -> Vec<Token>;

    fn count_tokens(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

// Words carry at most one leading space or tab. Newlines stand alone so
// they can serve as break points.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t]?\w+|\n|[^\w\s]|[ \t\r\x0B\x0C]+|\s").expect("token regex is valid")
});

/// Deterministic regex pre-tokenizer. Every byte of the input belongs to
/// exactly one token.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexTokenizer;

impl RegexTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for RegexTokenizer {
    fn name(&self) -> &str {
        "regex"
    }

    fn encode(&self, text: &str) -> Vec<Token> {
        TOKEN_RE
            .find_iter(text)
            .map(|m| Token {
                id: fnv1a(m.as_str().as_bytes()),
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str) -> Vec<&str> {
        RegexTokenizer
            .encode(text)
            .iter()
            .map(|t| t.text(text))
            .collect()
    }

    #[test]
    fn splits_words_with_leading_space() {
        assert_eq!(
            texts("This is a test."),
            vec!["This", " is", " a", " test", "."]
        );
    }

    #[test]
    fn newline_is_its_own_token() {
        let toks = texts("one\ntwo");
        assert_eq!(toks, vec!["one", "\n", "two"]);
    }

    #[test]
    fn covers_every_byte() {
        let text = "Héllo,  wörld!\n\n\tTabs — and 🦀 emoji?";
        let tokens = RegexTokenizer.encode(text);
        let mut pos = 0;
        for t in &tokens {
            assert_eq!(t.start, pos);
            pos = t.end;
        }
        assert_eq!(pos, text.len());
    }

    #[test]
    fn ids_are_stable() {
        let a = RegexTokenizer.encode("refund policy");
        let b = RegexTokenizer.encode("refund policy");
        assert_eq!(a, b);
        assert_ne!(a[0].id, a[1].id);
    }

    #[test]
    fn break_detection() {
        let text = "Done. Next\n";
        let tokens = RegexTokenizer.encode(text);
        let breaks: Vec<bool> = tokens.iter().map(|t| t.is_break(text)).collect();
        assert_eq!(breaks, vec![false, true, false, true]);
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert!(RegexTokenizer.encode("").is_empty());
        assert_eq!(RegexTokenizer.count_tokens("a b c"), 3);
    }
}
