//! Paragraph-boundary, token-bounded text chunker.
//!
//! # Algorithm
//!
//! 1. Split the text after every `\n\n`, keeping byte offsets. Each
//!    paragraph keeps its trailing delimiter, so the pieces tile the text.
//! 2. A paragraph whose *byte* length is below the token limit cannot hold
//!    that many tokens and is kept without tokenizing.
//! 3. Otherwise count its tokens. Below the limit it is kept; at or above it
//!    is cut into `tokens / limit + 1` segments of roughly equal byte
//!    length (snapped to char boundaries), and each segment is processed
//!    again from step 2.
//!
//! Every produced chunk therefore has strictly fewer than `token_limit`
//! tokens. A segment that cannot be cut further (a single character) is
//! kept as-is.

use crate::error::Result;
use crate::tokenizer::Tokenize;

use super::types::Chunk;

const PARAGRAPH_DELIMITER: &str = "\n\n";

/// Splits document text into token-bounded [`Chunk`]s.
pub struct Chunker<'a> {
    tokenizer: &'a dyn Tokenize,
    token_limit: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(tokenizer: &'a dyn Tokenize, token_limit: usize) -> Self {
        assert!(token_limit > 0, "token limit must be positive");
        Self {
            tokenizer,
            token_limit,
        }
    }

    /// Split `text` (the content of the document at `rel_path`) into chunks,
    /// in document order.
    pub fn split(&self, rel_path: &str, text: &str) -> Result<Vec<Chunk>> {
        let mut pieces = Vec::new();
        for (offset, paragraph) in split_paragraphs(text) {
            self.split_piece(offset, paragraph, &mut pieces)?;
        }
        tracing::debug!(rel_path, chunks = pieces.len(), "document chunked");
        Ok(pieces
            .into_iter()
            .map(|(offset, piece)| Chunk::new(rel_path, offset, piece))
            .collect())
    }

    fn split_piece<'t>(
        &self,
        offset: usize,
        piece: &'t str,
        out: &mut Vec<(usize, &'t str)>,
    ) -> Result<()> {
        // Every token spans at least one byte.
        if piece.len() < self.token_limit {
            out.push((offset, piece));
            return Ok(());
        }

        let tokens = self.tokenizer.count(piece)?;
        if tokens < self.token_limit {
            out.push((offset, piece));
            return Ok(());
        }

        let segments = tokens / self.token_limit + 1;
        let segment_len = piece.len().div_ceil(segments);

        let mut bounds = Vec::with_capacity(segments);
        let mut start = 0;
        while start < piece.len() {
            let end = ceil_char_boundary(piece, (start + segment_len).min(piece.len()));
            bounds.push((start, end));
            start = end;
        }

        if bounds.len() < 2 {
            tracing::warn!(offset, tokens, "piece cannot be split further");
            out.push((offset, piece));
            return Ok(());
        }

        for (start, end) in bounds {
            self.split_piece(offset + start, &piece[start..end], out)?;
        }
        Ok(())
    }
}

/// Split text after each paragraph delimiter, returning `(offset, piece)`
/// pairs that concatenate back to the input.
pub fn split_paragraphs(text: &str) -> Vec<(usize, &str)> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, delim) in text.match_indices(PARAGRAPH_DELIMITER) {
        let end = i + delim.len();
        pieces.push((start, &text[start..end]));
        start = end;
    }
    if start < text.len() {
        pieces.push((start, &text[start..]));
    }
    pieces
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
