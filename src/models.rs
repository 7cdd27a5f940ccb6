//! Registry of chat models the knowledge base can generate with.
//!
//! Each entry maps a user-facing name to the provider's model identifier and
//! the model's total context window in tokens. The context window drives the
//! retrieval budget: roughly half of it is reserved for retrieved chunks.

use serde::Serialize;

use crate::error::{GrokError, Result};

/// Model used when none is requested.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// A chat model known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    /// Name used on the command line and persisted in the store.
    pub name: &'static str,
    /// Identifier sent to the provider.
    pub provider_model: &'static str,
    /// Total tokens (prompt + completion) the model accepts per call.
    pub token_limit: usize,
}

const AVAILABLE: &[Model] = &[
    Model {
        name: "gpt-3.5-turbo",
        provider_model: "gpt-3.5-turbo",
        token_limit: 16_385,
    },
    Model {
        name: "gpt-4",
        provider_model: "gpt-4",
        token_limit: 8_192,
    },
    Model {
        name: "gpt-4-turbo",
        provider_model: "gpt-4-turbo",
        token_limit: 128_000,
    },
    Model {
        name: "gpt-4o",
        provider_model: "gpt-4o",
        token_limit: 128_000,
    },
    Model {
        name: "gpt-4o-mini",
        provider_model: "gpt-4o-mini",
        token_limit: 128_000,
    },
];

/// All registered models, in registry order.
pub fn available() -> &'static [Model] {
    AVAILABLE
}

/// Look up a model by name. An empty name selects [`DEFAULT_MODEL`].
pub fn find_model(name: &str) -> Result<&'static Model> {
    let name = if name.is_empty() { DEFAULT_MODEL } else { name };
    AVAILABLE
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| GrokError::UnknownModel(name.to_string()))
}
