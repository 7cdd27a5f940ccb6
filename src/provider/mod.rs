//! Model provider capability.
//!
//! The knowledge engine depends on exactly two remote operations: embedding a
//! batch of texts and completing a chat. Both live behind [`ModelProvider`],
//! which is injected into [`crate::knowledge::Grokker`] so the engine never
//! touches process environment or HTTP clients directly.
//!
//! All methods are synchronous. Callers in async contexts should use
//! `tokio::task::spawn_blocking`.

pub mod openai;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::GrokConfig;

/// Role tag of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Remote embedding and chat capability.
///
/// Implementations own their transport concerns (timeouts, retries). Errors
/// are propagated to the caller unchanged.
pub trait ModelProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input order.
    ///
    /// The caller guarantees the batch fits the provider's per-request token
    /// limit.
    fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Complete a chat transcript with `model`, returning the assistant reply.
    fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Create the configured provider.
///
/// Reads the API key from the environment variable named by
/// `provider.api_key_env`; fails if it is unset.
pub fn create_provider(config: &GrokConfig) -> Result<Box<dyn ModelProvider>> {
    let api_key = std::env::var(&config.provider.api_key_env).map_err(|_| {
        anyhow::anyhow!(
            "{} environment variable not set",
            config.provider.api_key_env
        )
    })?;
    let provider = openai::OpenAiProvider::new(&config.provider, &config.embedding.model, api_key)?;
    Ok(Box::new(provider))
}
