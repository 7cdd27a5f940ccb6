//! Error taxonomy for the knowledge engine.
//!
//! Configuration and version errors are fatal to the calling operation.
//! Provider errors pass through untouched. A document that has vanished
//! from disk is *not* an error anywhere in this crate; see
//! [`crate::knowledge::types::read_document`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by knowledge-base operations.
#[derive(Error, Debug)]
pub enum GrokError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model {0:?} not found")]
    UnknownModel(String),

    #[error("store already exists at {}", .0.display())]
    StoreExists(PathBuf),

    #[error("no store named {name:?} found in {} or any parent directory", .start.display())]
    StoreNotFound { name: String, start: PathBuf },

    #[error("store is version {store}, but you're running version {code} -- upgrade grokker")]
    StoreVersionTooNew { store: String, code: String },

    #[error("invalid version string {0:?}: {1}")]
    InvalidVersion(String, semver::Error),

    #[error("migration to {target} failed: {reason}")]
    Migration { target: String, reason: String },

    #[error("not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    #[error("document path {0} is not valid UTF-8")]
    InvalidDocument(String),

    #[error("failed to start embedding workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("embedding input {index} has {tokens} tokens, limit is {limit}")]
    EmbeddingInputTooLarge {
        index: usize,
        tokens: usize,
        limit: usize,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error(transparent)]
    Provider(#[from] anyhow::Error),

    #[error("{0}")]
    Input(String),
}

/// Result type for knowledge-base operations.
pub type Result<T> = std::result::Result<T, GrokError>;
