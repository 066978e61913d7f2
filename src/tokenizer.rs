//! Token counting adapters.
//!
//! The chunker and summarizer only need to know how many subword tokens a span
//! costs. Decoding is exposed for tooling that works on raw ids.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use tracing::warn;

pub trait TokenCounter: Send + Sync {
    /// Number of tokens `text` encodes to, without special tokens.
    fn token_length(&self, text: &str) -> usize;

    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// HuggingFace tokenizer loaded from a `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("loading tokenizer {}: {e}", path.display()))?;
        Ok(Self { inner })
    }
}

impl TokenCounter for HfTokenizer {
    fn token_length(&self, text: &str) -> usize {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                let estimate = estimate_tokens(text);
                warn!("tokenizer failed on {} bytes, estimating {estimate} tokens: {e}", text.len());
                estimate
            }
        }
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| anyhow!("decode failed: {e}"))
    }
}

/// Rough subword count used when encoding fails: a quarter of the bytes, never 0
/// for non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// One token per whitespace-separated word. Ids index into an internal vocabulary
/// built from every word seen by `encode`.
#[derive(Default)]
pub struct WhitespaceTokenizer {
    vocab: std::sync::Mutex<Vec<String>>,
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut vocab = self.vocab.lock().unwrap_or_else(|e| e.into_inner());
        text.split_whitespace()
            .map(|w| match vocab.iter().position(|v| v == w) {
                Some(i) => i as u32,
                None => {
                    vocab.push(w.to_string());
                    (vocab.len() - 1) as u32
                }
            })
            .collect()
    }
}

impl TokenCounter for WhitespaceTokenizer {
    fn token_length(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let vocab = self.vocab.lock().unwrap_or_else(|e| e.into_inner());
        let words = ids
            .iter()
            .map(|&id| {
                vocab
                    .get(id as usize)
                    .map(String::as_str)
                    .ok_or_else(|| anyhow!("unknown token id {id}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(words.join(" "))
    }
}

pub fn from_config(cfg: &Config) -> Result<Arc<dyn TokenCounter>> {
    match cfg.tokenizer.kind.as_str() {
        "huggingface" => {
            let tok = HfTokenizer::from_file(Path::new(&cfg.tokenizer.file))
                .with_context(|| "tokenizer.kind = huggingface")?;
            Ok(Arc::new(tok))
        }
        "whitespace" => Ok(Arc::new(WhitespaceTokenizer::new())),
        other => anyhow::bail!("unknown tokenizer.kind: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_counts_words() {
        let tok = WhitespaceTokenizer::new();
        assert_eq!(tok.token_length("the  court\nheld"), 3);
        assert_eq!(tok.token_length(""), 0);
    }

    #[test]
    fn estimate_is_nonzero_for_text() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("appellant"), 3);
    }

    #[test]
    fn whitespace_decode_inverts_encode() {
        let tok = WhitespaceTokenizer::new();
        let ids = tok.encode("appeal allowed appeal");
        assert_eq!(ids, vec![0, 1, 0]);
        assert_eq!(tok.decode(&ids).unwrap(), "appeal allowed appeal");
        assert!(tok.decode(&[9]).is_err());
    }
}
