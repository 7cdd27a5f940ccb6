//! Similarity ranking and token-budgeted context assembly.

use std::path::Path;

use crate::error::Result;
use crate::tokenizer::Tokenize;

use super::types::{Chunk, DocumentReader};

/// A ranked chunk together with its document-qualified text.
#[derive(Debug, Clone)]
pub struct RelevantChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
    /// `"from {rel_path}:\n{text}\n"`, as sent to the model.
    pub text: String,
    pub tokens: usize,
}

/// Cosine similarity. Returns 0.0 for mismatched lengths, empty vectors, or
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Rank `chunks` against `query` and take the best ones until the next
/// would push the running token total past `token_budget`.
///
/// Chunks without an embedding are not ranked. Chunks whose document is
/// missing on disk keep their rank but contribute no text and are left out
/// of the result.
pub fn similar_chunks<'a>(
    query: &[f32],
    token_budget: usize,
    chunks: &'a [Chunk],
    root: &Path,
    tokenizer: &dyn Tokenize,
) -> Result<Vec<RelevantChunk<'a>>> {
    tracing::debug!(chunks = chunks.len(), token_budget, "ranking chunks");

    let mut scored: Vec<(&Chunk, f32)> = chunks
        .iter()
        .filter_map(|c| {
            c.embedding
                .as_deref()
                .map(|e| (c, cosine_similarity(query, e)))
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut reader = DocumentReader::new(root);
    let mut total = 0usize;
    let mut relevant = Vec::new();
    for (chunk, score) in scored {
        let text = reader.chunk_text(chunk, true)?;
        if text.is_empty() {
            continue;
        }
        let tokens = tokenizer.count(&text)?;
        if total + tokens > token_budget {
            break;
        }
        total += tokens;
        relevant.push(RelevantChunk {
            chunk,
            score,
            text,
            tokens,
        });
    }

    tracing::debug!(found = relevant.len(), tokens = total, "similar chunks");
    Ok(relevant)
}

/// Concatenate the qualified texts of ranked chunks into one context string.
pub fn build_context(relevant: &[RelevantChunk<'_>]) -> String {
    relevant.iter().map(|r| r.text.as_str()).collect()
}
