//! Tokenizer selection for the chunker.
//!
//! `regex` uses the built-in [`RegexTokenizer`]. `huggingface` loads a
//! `tokenizer.json` and requires building with `--features hf-tokenizer`.

use anyhow::Result;
use std::sync::Arc;

use deskrag_core::tokenizer::{RegexTokenizer, Tokenizer};

use crate::config::ChunkingConfig;

#[cfg(feature = "hf-tokenizer")]
pub use hf::HfTokenizer;

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use anyhow::Result;
    use std::path::Path;
    use tracing::warn;

    use deskrag_core::tokenizer::{RegexTokenizer, Token, Tokenizer};

    /// Hugging Face tokenizer adapter. Token spans come from the
    /// encoding's byte offsets.
    pub struct HfTokenizer {
        name: String,
        inner: tokenizers::Tokenizer,
    }

    impl HfTokenizer {
        pub fn from_file(path: &Path) -> Result<Self> {
            let inner = tokenizers::Tokenizer::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load tokenizer {}: {}", path.display(), e))?;
            Ok(Self {
                name: path.display().to_string(),
                inner,
            })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn name(&self) -> &str {
            &self.name
        }

        fn encode(&self, text: &str) -> Vec<Token> {
            match self.inner.encode(text, false) {
                Ok(encoding) => encoding
                    .get_ids()
                    .iter()
                    .zip(encoding.get_offsets())
                    .filter(|(_, (start, end))| start < end)
                    .map(|(&id, &(start, end))| Token { id, start, end })
                    .collect(),
                Err(e) => {
                    warn!(error = %e, tokenizer = %self.name, "encode failed, using regex tokenizer");
                    RegexTokenizer.encode(text)
                }
            }
        }
    }
}

/// Build the tokenizer named by `[chunking] tokenizer`.
pub fn build_tokenizer(config: &ChunkingConfig) -> Result<Arc<dyn Tokenizer>> {
    match config.tokenizer.as_str() {
        "regex" => Ok(Arc::new(RegexTokenizer::new())),
        #[cfg(feature = "hf-tokenizer")]
        "huggingface" => {
            let path = config
                .tokenizer_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("chunking.tokenizer_path is required"))?;
            Ok(Arc::new(HfTokenizer::from_file(path)?))
        }
        #[cfg(not(feature = "hf-tokenizer"))]
        "huggingface" => anyhow::bail!(
            "The huggingface tokenizer requires building with --features hf-tokenizer"
        ),
        other => anyhow::bail!("Unknown tokenizer: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_is_default() {
        let tok = build_tokenizer(&ChunkingConfig::default()).unwrap();
        assert_eq!(tok.name(), "regex");
        assert_eq!(tok.count_tokens("Returns accepted within 30 days."), 6);
    }

    #[cfg(not(feature = "hf-tokenizer"))]
    #[test]
    fn huggingface_needs_feature() {
        let config = ChunkingConfig {
            tokenizer: "huggingface".into(),
            tokenizer_path: Some("tokenizer.json".into()),
            ..Default::default()
        };
        assert!(build_tokenizer(&config).is_err());
    }
}
