#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use grokker::knowledge::{Grokker, Runtime};
use grokker::provider::{ChatMessage, ModelProvider};
use grokker::tokenizer::Tokenize;

/// Words that get their own embedding dimension.
pub const KEYWORDS: &[&str] = &["cat", "dog", "fish", "bird"];

/// One token per whitespace-separated word.
pub struct WordTokenizer;

impl Tokenize for WordTokenizer {
    fn encode(&self, text: &str) -> grokker::Result<Vec<u32>> {
        Ok(text.split_whitespace().map(|w| w.len() as u32).collect())
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Deterministic provider: an embedding counts occurrences of each of
/// [`KEYWORDS`] plus a small constant dimension. Every embedding batch and
/// chat transcript is recorded.
#[derive(Default)]
pub struct KeywordProvider {
    pub batches: Mutex<Vec<Vec<String>>>,
    pub chats: Mutex<Vec<Vec<ChatMessage>>>,
}

impl KeywordProvider {
    pub fn embedding_calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn embedded_texts(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }
}

pub fn keyword_embedding(text: &str) -> Vec<f32> {
    let mut v: Vec<f32> = KEYWORDS
        .iter()
        .map(|k| text.matches(k).count() as f32)
        .collect();
    v.push(0.01);
    v
}

impl ModelProvider for KeywordProvider {
    fn create_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batches.lock().unwrap().push(texts.to_vec());
        Ok(texts.iter().map(|t| keyword_embedding(t)).collect())
    }

    fn chat(&self, _model: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let mut chats = self.chats.lock().unwrap();
        chats.push(messages.to_vec());
        Ok(format!("reply {}", chats.len()))
    }
}

/// A knowledge-base root in a temp directory with a recording provider.
pub struct TestKb {
    pub dir: tempfile::TempDir,
    pub provider: Arc<KeywordProvider>,
    pub embedding_token_limit: usize,
}

impl TestKb {
    pub fn new() -> Self {
        Self::with_limit(8192)
    }

    pub fn with_limit(embedding_token_limit: usize) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            provider: Arc::new(KeywordProvider::default()),
            embedding_token_limit,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, text: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Rewrite a document and push its mtime past the store's.
    pub fn edit(&self, name: &str, text: &str) {
        let path = self.write(name, text);
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    }

    pub fn runtime(&self) -> Runtime {
        Runtime::new(self.provider.clone(), Arc::new(WordTokenizer))
            .with_embedding_limits(self.embedding_token_limit, 2)
    }

    pub fn init(&self) -> Grokker {
        Grokker::init(self.root(), "", self.runtime()).unwrap()
    }

    pub fn load(&self) -> Grokker {
        Grokker::load(self.path(".grok"), self.runtime()).unwrap().0
    }
}

/// `n` space-separated copies of `word`.
pub fn words(word: &str, n: usize) -> String {
    vec![word; n].join(" ")
}
