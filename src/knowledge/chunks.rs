//! Chunk store with content-hash identity and mark/reconcile/collect GC.
//!
//! Chunks are kept in insertion order alongside a `(hash, rel_path) → index`
//! map. Re-chunking a document is a three-step protocol:
//!
//! 1. **Mark**: every chunk of the document is flagged stale.
//! 2. **Reconcile**: each freshly derived chunk either revives the stored
//!    chunk with the same key (refreshing its offset and length) or is
//!    appended without an embedding.
//! 3. **Collect**: once every document of the pass has been reconciled,
//!    [`ChunkStore::garbage_collect`] drops whatever is still stale.
//!
//! The index is only rebuilt by collection, so indices returned by a
//! reconcile stay valid until the next [`ChunkStore::garbage_collect`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::Result;

use super::chunker::Chunker;
use super::types::{read_document, Chunk, Document};

type ChunkKey = (String, String);

/// Result of reconciling one document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// `false` when the document file was missing and nothing was touched.
    pub found: bool,
    /// Number of chunks appended by this pass.
    pub appended: usize,
    /// Indices of chunks (appended or revived) that still need an embedding.
    pub pending: Vec<usize>,
}

impl Reconciliation {
    /// Whether any new chunks were appended.
    pub fn updated(&self) -> bool {
        self.appended > 0
    }
}

#[derive(Debug, Default, Clone)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    index: HashMap<ChunkKey, usize>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from persisted chunks. Later duplicates of a key are dropped.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let mut store = Self::new();
        for chunk in chunks {
            if store.index.contains_key(&chunk.key()) {
                tracing::warn!(hash = %chunk.hash, rel_path = %chunk.rel_path, "dropping duplicate chunk");
                continue;
            }
            store.push(chunk);
        }
        store
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, hash: &str, rel_path: &str) -> Option<&Chunk> {
        self.index
            .get(&(hash.to_string(), rel_path.to_string()))
            .map(|&i| &self.chunks[i])
    }

    pub(crate) fn chunk_mut(&mut self, index: usize) -> &mut Chunk {
        &mut self.chunks[index]
    }

    fn push(&mut self, chunk: Chunk) -> usize {
        let i = self.chunks.len();
        self.index.insert(chunk.key(), i);
        self.chunks.push(chunk);
        i
    }

    /// Flag every chunk of `rel_path` stale. Returns how many were marked.
    pub fn mark_stale(&mut self, rel_path: &str) -> usize {
        let mut marked = 0;
        for chunk in self.chunks.iter_mut().filter(|c| c.rel_path == rel_path) {
            chunk.stale = true;
            marked += 1;
        }
        marked
    }

    /// Ensure `chunk` is stored with its current offset and length and is
    /// not stale. Returns the index if it was appended, `None` if an
    /// existing chunk with the same key was revived.
    pub fn set_chunk(&mut self, mut chunk: Chunk) -> Option<usize> {
        if let Some(&i) = self.index.get(&chunk.key()) {
            let existing = &mut self.chunks[i];
            existing.offset = chunk.offset;
            existing.length = chunk.length;
            existing.stale = false;
            if existing.text.is_empty() {
                existing.text = chunk.text;
            }
            return None;
        }
        chunk.stale = false;
        chunk.embedding = None;
        Some(self.push(chunk))
    }

    /// Mark, re-chunk, and reconcile one document.
    ///
    /// A missing backing file is not an error: nothing is marked and the
    /// document's chunks are left intact.
    pub fn reconcile_document(
        &mut self,
        root: &Path,
        doc: &Document,
        chunker: &Chunker<'_>,
    ) -> Result<Reconciliation> {
        let Some(text) = read_document(root, &doc.rel_path)? else {
            tracing::debug!(rel_path = %doc.rel_path, "skipping reconcile of missing document");
            return Ok(Reconciliation::default());
        };

        let derived = chunker.split(&doc.rel_path, &text)?;
        self.mark_stale(&doc.rel_path);

        let mut outcome = Reconciliation {
            found: true,
            ..Reconciliation::default()
        };
        for chunk in derived {
            let key = chunk.key();
            match self.set_chunk(chunk) {
                Some(i) => {
                    outcome.appended += 1;
                    outcome.pending.push(i);
                }
                None => {
                    let i = self.index[&key];
                    if self.chunks[i].embedding.is_none() && !outcome.pending.contains(&i) {
                        outcome.pending.push(i);
                    }
                }
            }
        }

        tracing::debug!(
            rel_path = %doc.rel_path,
            appended = outcome.appended,
            pending = outcome.pending.len(),
            "document reconciled"
        );
        Ok(outcome)
    }

    /// Remove every chunk still marked stale. Returns how many were removed.
    pub fn garbage_collect(&mut self) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|c| !c.stale);
        self.rebuild_index();
        let removed = before - self.chunks.len();
        tracing::debug!(removed, "garbage collected chunks");
        removed
    }

    /// Remove chunks whose document is not in `tracked`. Returns how many were removed.
    pub fn remove_untracked(&mut self, tracked: &HashSet<&str>) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|c| tracked.contains(c.rel_path.as_str()));
        self.rebuild_index();
        before - self.chunks.len()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.key(), i))
            .collect();
    }
}
