//! Grokker: a retrieval-augmented knowledge base for a directory of documents.
//!
//! Documents are chunked on paragraph boundaries, embedded through an
//! OpenAI-compatible provider, and stored alongside their embeddings in a
//! single JSON file at the root of the directory. Queries retrieve the most
//! similar chunks within a token budget and send them to a chat model as
//! context.
//!
//! # Architecture
//!
//! - **Store**: one versioned JSON file (`.grok`), written atomically and
//!   migrated forward on load
//! - **Chunks**: identified by a SHA-256 of their document-qualified text, so
//!   unchanged text keeps its embedding when it moves within a document
//! - **Tokens**: counted with a Hugging Face `tokenizer.json` (cl100k_base)
//! - **Provider**: embeddings and chat behind the [`provider::ModelProvider`] trait
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`db`]: store persistence, discovery, and migrations
//! - [`knowledge`]: chunking, embedding, retrieval, and the [`knowledge::Grokker`] aggregate
//! - [`models`]: chat model registry
//! - [`provider`]: model provider trait and the OpenAI-compatible client
//! - [`tokenizer`]: token counting

pub mod config;
pub mod db;
pub mod error;
pub mod knowledge;
pub mod models;
pub mod provider;
pub mod tokenizer;

pub use error::{GrokError, Result};
