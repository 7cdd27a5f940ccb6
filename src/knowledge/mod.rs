//! Retrieval-augmented knowledge engine.
//!
//! Documents are split into token-bounded chunks ([`chunker`]), tracked by
//! content hash ([`chunks`]), embedded in token-bounded batches
//! ([`batcher`]), and ranked against queries by cosine similarity
//! ([`retrieve`]). [`Grokker`] ties these together with the on-disk store.

pub mod batcher;
pub mod chunker;
pub mod chunks;
pub mod generate;
pub mod grokker;
pub mod retrieve;
pub mod types;

pub use grokker::{Generation, Grokker, Runtime, DEFAULT_STORE_NAME};
pub use retrieve::RelevantChunk;
pub use types::{Chunk, Document};
