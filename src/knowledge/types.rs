//! Document and chunk definitions.
//!
//! A [`Chunk`] never stores its text on disk: it records a byte range into
//! its document, and the text is re-read from the document when needed.
//! When the document file is gone (e.g. another branch is checked out) the
//! text is simply empty.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// A tracked document, identified by its path relative to the knowledge-base root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub rel_path: String,
}

impl Document {
    pub fn new(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
        }
    }
}

/// A byte range of a document plus its cached embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning document's relative path.
    pub rel_path: String,
    /// Byte offset into the document.
    pub offset: usize,
    /// Byte length.
    pub length: usize,
    /// SHA-256 (hex) of the document-qualified text, see [`qualified_text`].
    pub hash: String,
    /// `None` until the embedding has been computed.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Text captured at chunking time; never persisted.
    #[serde(skip)]
    pub(crate) text: String,
    /// Reconciliation mark; reset to `false` on load.
    #[serde(skip)]
    pub(crate) stale: bool,
}

impl Chunk {
    /// Build a chunk for `text` found at `offset` in the document at `rel_path`.
    pub fn new(rel_path: &str, offset: usize, text: &str) -> Self {
        Self {
            rel_path: rel_path.to_string(),
            offset,
            length: text.len(),
            hash: chunk_hash(rel_path, text),
            embedding: None,
            text: text.to_string(),
            stale: false,
        }
    }

    /// Text captured when the chunk was created; empty for loaded chunks.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Identity key: identical text in different documents is distinct.
    pub fn key(&self) -> (String, String) {
        (self.hash.clone(), self.rel_path.clone())
    }

    pub(crate) fn set_embedding(&mut self, embedding: Vec<f32>) {
        debug_assert!(!self.hash.is_empty(), "embedded chunk must have a hash");
        debug_assert!(!self.text.is_empty(), "embedded chunk must have text");
        self.embedding = Some(embedding);
    }
}

/// Render chunk text with its document header: `"from {rel_path}:\n{text}\n"`.
pub fn qualified_text(rel_path: &str, text: &str) -> String {
    format!("from {rel_path}:\n{text}\n")
}

/// SHA-256 hex digest of the document-qualified chunk text.
pub fn chunk_hash(rel_path: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(qualified_text(rel_path, text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Read a document's text. `Ok(None)` means the file does not exist.
///
/// Invalid UTF-8 is decoded lossily.
pub fn read_document(root: &Path, rel_path: &str) -> Result<Option<String>> {
    let path = root.join(rel_path);
    match std::fs::read(&path) {
        Ok(buf) => Ok(Some(match String::from_utf8(buf) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(rel_path, "document is not valid UTF-8, decoding lossily");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        })),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "document missing on disk");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Slice a chunk's byte range out of its document text, clamped to the text.
pub fn slice_chunk<'a>(doc_text: &'a str, chunk: &Chunk) -> &'a str {
    let bytes = doc_text.as_bytes();
    let start = chunk.offset.min(bytes.len());
    let stop = chunk.offset.saturating_add(chunk.length).min(bytes.len());
    // Documents may have been edited since chunking; never split a char.
    let start = floor_char_boundary(doc_text, start);
    let stop = floor_char_boundary(doc_text, stop.max(start));
    &doc_text[start..stop]
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Per-call cache of document contents, so ranking many chunks of the same
/// document reads the file once.
pub struct DocumentReader<'a> {
    root: &'a Path,
    cache: HashMap<String, Option<String>>,
}

impl<'a> DocumentReader<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self {
            root,
            cache: HashMap::new(),
        }
    }

    /// Chunk text re-read from its document. Empty when the document is gone.
    pub fn chunk_text(&mut self, chunk: &Chunk, with_header: bool) -> Result<String> {
        if !self.cache.contains_key(&chunk.rel_path) {
            let doc = read_document(self.root, &chunk.rel_path)?;
            self.cache.insert(chunk.rel_path.clone(), doc);
        }
        let Some(Some(doc)) = self.cache.get(&chunk.rel_path) else {
            return Ok(String::new());
        };
        let text = slice_chunk(doc, chunk);
        Ok(if with_header {
            qualified_text(&chunk.rel_path, text)
        } else {
            text.to_string()
        })
    }
}
