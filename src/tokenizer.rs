//! Tokenizer adapter.
//!
//! Every token budget in the engine (chunk size, embedding batch size,
//! retrieval context size) is measured through the [`Tokenize`] trait.
//! [`HfTokenizer`] is the production implementation, loading a
//! `tokenizer.json` in Hugging Face format (cl100k_base by default; fetch it
//! with `grok tokenizer download`).

use std::path::Path;

use crate::error::{GrokError, Result};

/// Counts and encodes text into model tokens.
pub trait Tokenize: Send + Sync {
    /// Encode text into token ids, without special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// [`Tokenize`] backed by the `tokenizers` crate.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GrokError::Tokenizer(format!(
                "tokenizer not found at {}. Run `grok tokenizer download` first.",
                path.display()
            )));
        }

        let mut inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| GrokError::Tokenizer(format!("failed to load tokenizer: {e}")))?;

        // Budgets need the true length of every input.
        inner
            .with_truncation(None)
            .map_err(|e| GrokError::Tokenizer(format!("failed to disable truncation: {e}")))?;
        inner.with_padding(None);

        tracing::debug!(tokenizer = %path.display(), "tokenizer loaded");
        Ok(Self { inner })
    }
}

impl Tokenize for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| GrokError::Tokenizer(format!("tokenization failed: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }
}

/// One token per whitespace-separated word. Test double for budget logic.
#[cfg(test)]
pub(crate) struct WordTokenizer;

#[cfg(test)]
impl Tokenize for WordTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.split_whitespace().map(|w| w.len() as u32).collect())
    }
}
