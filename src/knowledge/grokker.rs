//! The knowledge base aggregate.
//!
//! A [`Grokker`] owns the tracked document list, the [`ChunkStore`], the
//! active chat model, and the path of its store file. The root directory is
//! always the directory containing the store file.
//!
//! Document freshness is driven by modification time: a document whose file
//! is newer than the store file is re-chunked by
//! [`update_embeddings`](Grokker::update_embeddings). Every pass that
//! reconciles documents embeds the chunks it created and then collects stale
//! chunks exactly once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

use crate::db::{self, MigrationReport};
use crate::error::{GrokError, Result};
use crate::models::{self, Model};
use crate::provider::ModelProvider;
use crate::tokenizer::Tokenize;

use super::batcher::EmbeddingBatcher;
use super::chunker::Chunker;
use super::chunks::ChunkStore;
use super::generate::{self, SYSMSG_CHAT, SYSMSG_CONTINUE, SYSMSG_REVISE};
use super::retrieve::{self, RelevantChunk};
use super::types::{qualified_text, Document};

/// Store file name used by [`Grokker::init`].
pub const DEFAULT_STORE_NAME: &str = ".grok";

/// Token limit per embedding request when none is configured.
pub const DEFAULT_EMBEDDING_TOKEN_LIMIT: usize = 8192;

/// Share of the model's token limit reserved for retrieved context.
const CONTEXT_SHARE: f64 = 0.5;

/// Continuation leaves more room for the generated text.
const CONTINUE_CONTEXT_SHARE: f64 = 0.4;

/// Headroom between a chunk and its qualified rendering, which is what
/// actually gets embedded.
const HEADER_MARGIN: usize = 2;

/// Collaborators injected into a [`Grokker`].
#[derive(Clone)]
pub struct Runtime {
    pub provider: Arc<dyn ModelProvider>,
    pub tokenizer: Arc<dyn Tokenize>,
    /// Maximum tokens per embedding request (and per single input).
    pub embedding_token_limit: usize,
    /// Maximum embedding requests in flight at once.
    pub parallelism: usize,
    pool: Arc<OnceLock<Arc<rayon::ThreadPool>>>,
}

impl Runtime {
    pub fn new(provider: Arc<dyn ModelProvider>, tokenizer: Arc<dyn Tokenize>) -> Self {
        Self {
            provider,
            tokenizer,
            embedding_token_limit: DEFAULT_EMBEDDING_TOKEN_LIMIT,
            parallelism: 4,
            pool: Arc::default(),
        }
    }

    pub fn with_embedding_limits(mut self, token_limit: usize, parallelism: usize) -> Self {
        self.embedding_token_limit = token_limit;
        self.parallelism = parallelism;
        self.pool = Arc::default();
        self
    }

    /// Worker pool for concurrent embedding requests, built on first use.
    /// `None` when requests are sent one at a time.
    fn embedding_pool(&self) -> Result<Option<Arc<rayon::ThreadPool>>> {
        if self.parallelism <= 1 {
            return Ok(None);
        }
        if let Some(pool) = self.pool.get() {
            return Ok(Some(pool.clone()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .thread_name(|i| format!("grok-embed-{i}"))
            .build()?;
        tracing::debug!(threads = self.parallelism, "started embedding workers");
        Ok(Some(self.pool.get_or_init(|| Arc::new(pool)).clone()))
    }
}

/// Output of a revise or continue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub output: String,
    /// The system message the model was given.
    pub sysmsg: String,
}

pub struct Grokker {
    pub(crate) version: String,
    pub(crate) root: PathBuf,
    pub(crate) store_path: PathBuf,
    pub(crate) model: &'static Model,
    pub(crate) documents: Vec<Document>,
    pub(crate) chunks: ChunkStore,
    pub(crate) runtime: Runtime,
}

impl Grokker {
    /// Create a `.grok` store in `root`.
    pub fn init(root: impl AsRef<Path>, model: &str, runtime: Runtime) -> Result<Self> {
        Self::init_named(root, DEFAULT_STORE_NAME, model, runtime)
    }

    /// Create a store file called `name` in `root`. Fails if it already exists.
    pub fn init_named(
        root: impl AsRef<Path>,
        name: &str,
        model: &str,
        runtime: Runtime,
    ) -> Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        let model = models::find_model(model)?;
        let store_path = root.join(name);
        if store_path.exists() {
            return Err(GrokError::StoreExists(store_path));
        }

        let grok = Self {
            version: db::CODE_VERSION.to_string(),
            root,
            store_path,
            model,
            documents: Vec::new(),
            chunks: ChunkStore::new(),
            runtime,
        };
        grok.save()?;
        tracing::info!(store = %grok.store_path.display(), model = model.name, "initialized store");
        Ok(grok)
    }

    /// Load and migrate the store at `store_path`.
    pub fn load(store_path: impl AsRef<Path>, runtime: Runtime) -> Result<(Self, MigrationReport)> {
        db::load_from(store_path, runtime)
    }

    /// Write the store atomically.
    pub fn save(&self) -> Result<()> {
        db::save(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn model(&self) -> &'static Model {
        self.model
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn code_version(&self) -> &'static str {
        db::CODE_VERSION
    }

    pub fn store_version(&self) -> &str {
        &self.version
    }

    /// Last modification time of the store file.
    pub fn store_mtime(&self) -> Result<DateTime<Utc>> {
        let modified = std::fs::metadata(&self.store_path)?.modified()?;
        Ok(modified.into())
    }

    /// Relative paths of all tracked documents.
    pub fn list_documents(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.rel_path.clone()).collect()
    }

    pub fn list_models(&self) -> &'static [Model] {
        models::available()
    }

    /// Switch the chat model. Returns the previous model's name.
    pub fn set_model(&mut self, name: &str) -> Result<&'static str> {
        let model = models::find_model(name)?;
        let previous = std::mem::replace(&mut self.model, model);
        tracing::info!(from = previous.name, to = model.name, "model changed");
        Ok(previous.name)
    }

    /// Track a document and embed its new chunks.
    ///
    /// `path` is absolute or relative to the current directory. Adding an
    /// already tracked document re-reconciles it.
    pub fn add_document(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let abs = std::path::absolute(path)?;
        if !abs.exists() {
            return Err(GrokError::DocumentNotFound(path.to_path_buf()));
        }
        let abs = std::fs::canonicalize(&abs)?;
        let rel_path = self.relative_path(&abs)?;

        let doc = Document::new(rel_path);
        if !self.documents.contains(&doc) {
            tracing::debug!(rel_path = %doc.rel_path, "tracking document");
            self.documents.push(doc.clone());
        }
        self.reconcile(&[doc])?;
        Ok(())
    }

    /// Stop tracking a document. Its chunks stay until [`prune_orphans`](Self::prune_orphans).
    ///
    /// Matches either the stored relative path or the document's absolute
    /// path. Returns whether a document was removed.
    pub fn forget_document(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        // The root is canonical; resolve symlinks and `..` when the file still exists.
        let abs = match std::fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(_) => std::path::absolute(path)?,
        };
        let position = self.documents.iter().position(|d| {
            Path::new(&d.rel_path) == path || self.root.join(&d.rel_path) == abs
        });
        match position {
            Some(i) => {
                let doc = self.documents.remove(i);
                tracing::debug!(rel_path = %doc.rel_path, "forgot document");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-chunk documents modified since the store was last saved.
    ///
    /// Documents missing on disk are skipped but stay tracked, since they
    /// may exist on another branch. Returns whether any document was
    /// re-chunked; the store then differs from disk and should be saved.
    pub fn update_embeddings(&mut self) -> Result<bool> {
        let last_update = self.store_mtime()?;
        let mut changed = Vec::new();
        for doc in &self.documents {
            let path = self.root.join(&doc.rel_path);
            let modified = match std::fs::metadata(&path) {
                Ok(meta) => meta.modified()?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(rel_path = %doc.rel_path, "document missing, not updating");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if DateTime::<Utc>::from(modified) > last_update {
                changed.push(doc.clone());
            }
        }
        self.reconcile(&changed)
    }

    /// Reconcile every tracked document regardless of modification time.
    ///
    /// Documents missing on disk are dropped from tracking; their chunks
    /// persist until [`prune_orphans`](Self::prune_orphans).
    pub fn refresh_embeddings(&mut self) -> Result<()> {
        let root = &self.root;
        self.documents.retain(|doc| {
            let exists = root.join(&doc.rel_path).exists();
            if !exists {
                tracing::info!(rel_path = %doc.rel_path, "document gone, forgetting");
            }
            exists
        });
        let docs = self.documents.clone();
        for doc in &docs {
            tracing::info!(rel_path = %doc.rel_path, "refreshing embeddings");
        }
        self.reconcile(&docs)?;
        Ok(())
    }

    /// Remove chunks of documents that are no longer tracked.
    pub fn prune_orphans(&mut self) -> usize {
        let tracked: HashSet<&str> = self.documents.iter().map(|d| d.rel_path.as_str()).collect();
        let removed = self.chunks.remove_untracked(&tracked);
        tracing::debug!(removed, "pruned orphaned chunks");
        removed
    }

    /// Chunks most similar to `query`, best first, within `token_budget`.
    pub fn find_relevant(&self, query: &str, token_budget: usize) -> Result<Vec<RelevantChunk<'_>>> {
        let mut embeddings = self.embed(&[query.to_string()])?;
        let query_embedding = embeddings
            .pop()
            .ok_or_else(|| GrokError::Provider(anyhow::anyhow!("no embedding for query")))?;
        retrieve::similar_chunks(
            &query_embedding,
            token_budget,
            self.chunks.chunks(),
            &self.root,
            self.runtime.tokenizer.as_ref(),
        )
    }

    /// Retrieved context for `query`, as sent to the model.
    pub fn context(&self, query: &str, token_budget: usize) -> Result<String> {
        let relevant = self.find_relevant(query, token_budget)?;
        tracing::debug!(chunks = relevant.len(), "using chunks as context");
        Ok(retrieve::build_context(&relevant))
    }

    /// Answer a question using the knowledge base as context. With `global`
    /// the model's own knowledge is consulted first.
    pub fn answer(&self, question: &str, global: bool) -> Result<String> {
        let budget = self
            .context_budget(CONTEXT_SHARE)
            .saturating_sub(self.count(question)?);
        let context = self.context(question, budget)?;
        self.generate(SYSMSG_CHAT, question, &context, global)
    }

    /// Revise `input` in light of the knowledge base.
    ///
    /// With `sysmsg_in`, the first paragraph of `input` is used as the
    /// system message and is prepended to the output.
    pub fn revise(&self, input: &str, global: bool, sysmsg_in: bool) -> Result<Generation> {
        let sysmsg = if sysmsg_in {
            generate::split_sysmsg(input)?
        } else {
            SYSMSG_REVISE
        };

        let budget = self
            .context_budget(CONTEXT_SHARE)
            .saturating_sub(self.count(input)?);
        let context = self.context(input, budget)?;
        let response = self.generate(sysmsg, input, &context, global)?;

        let output = if sysmsg_in {
            format!("{sysmsg}\n\n{response}")
        } else {
            response
        };
        Ok(Generation {
            output,
            sysmsg: sysmsg.to_string(),
        })
    }

    /// Continue `input` in light of the knowledge base.
    pub fn continue_text(&self, input: &str, global: bool) -> Result<Generation> {
        let budget = self
            .context_budget(CONTINUE_CONTEXT_SHARE)
            .saturating_sub(self.count(SYSMSG_CONTINUE)?)
            .saturating_sub(self.count(input)?);
        let context = self.context(input, budget)?;
        let output = self.generate(SYSMSG_CONTINUE, input, &context, global)?;
        Ok(Generation {
            output,
            sysmsg: SYSMSG_CONTINUE.to_string(),
        })
    }

    /// Send a question with explicit context to the active model.
    pub fn generate(&self, sysmsg: &str, question: &str, context: &str, global: bool) -> Result<String> {
        generate::generate(
            self.runtime.provider.as_ref(),
            self.model.provider_model,
            sysmsg,
            question,
            context,
            global,
        )
    }

    /// Embed texts in token-bounded batches.
    pub fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts)
    }

    /// Mark, reconcile, embed, and collect for `docs`. Returns whether any
    /// document was found and re-chunked, even if only offsets moved or
    /// chunks were collected.
    fn reconcile(&mut self, docs: &[Document]) -> Result<bool> {
        let mut reconciled = false;
        let mut appended = 0;
        let mut pending = Vec::new();
        for doc in docs {
            let limit = self.chunk_token_limit(&doc.rel_path)?;
            let chunker = Chunker::new(self.runtime.tokenizer.as_ref(), limit);
            let outcome = self.chunks.reconcile_document(&self.root, doc, &chunker)?;
            reconciled |= outcome.found;
            appended += outcome.appended;
            pending.extend(outcome.pending);
        }

        // Indices stay valid until garbage collection.
        let texts: Vec<String> = pending
            .iter()
            .map(|&i| {
                let chunk = &self.chunks.chunks()[i];
                qualified_text(&chunk.rel_path, chunk.text())
            })
            .collect();
        let embeddings = self.embed(&texts)?;
        for (&i, embedding) in pending.iter().zip(embeddings) {
            self.chunks.chunk_mut(i).set_embedding(embedding);
        }

        let collected = self.chunks.garbage_collect();
        tracing::debug!(
            documents = docs.len(),
            appended,
            embedded = pending.len(),
            collected,
            chunks = self.chunks.len(),
            "reconcile pass complete"
        );
        Ok(reconciled)
    }

    /// Largest chunk size whose qualified rendering still fits one
    /// embedding input.
    fn chunk_token_limit(&self, rel_path: &str) -> Result<usize> {
        let header = self.count(&qualified_text(rel_path, ""))?;
        Ok(self
            .runtime
            .embedding_token_limit
            .saturating_sub(header + HEADER_MARGIN)
            .max(1))
    }

    fn context_budget(&self, share: f64) -> usize {
        (self.model.token_limit as f64 * share).floor() as usize
    }

    fn count(&self, text: &str) -> Result<usize> {
        self.runtime.tokenizer.count(text)
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batcher = EmbeddingBatcher::new(
            self.runtime.provider.as_ref(),
            self.runtime.tokenizer.as_ref(),
            self.runtime.embedding_token_limit,
        );
        match self.runtime.embedding_pool()? {
            Some(pool) => batcher.with_pool(&pool).embed(texts),
            None => batcher.embed(texts),
        }
    }

    fn relative_path(&self, abs: &Path) -> Result<String> {
        let rel = abs.strip_prefix(&self.root).map_err(|_| {
            GrokError::Input(format!(
                "{} is outside the knowledge base root {}",
                abs.display(),
                self.root.display()
            ))
        })?;
        rel.to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| GrokError::InvalidDocument(rel.display().to_string()))
    }
}
