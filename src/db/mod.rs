//! On-disk knowledge base store.
//!
//! The whole knowledge base is one JSON file. Saves go to `<store>.tmp`
//! and are renamed over the store, so an interrupted save leaves the
//! previous store intact. Loads run [`migrations::migrate`] on the raw JSON
//! before deserializing.

pub mod migrations;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GrokError, Result};
use crate::knowledge::chunks::ChunkStore;
use crate::knowledge::grokker::{Grokker, Runtime};
use crate::knowledge::types::{Chunk, Document};
use crate::models;

pub use migrations::{MigrationReport, CODE_VERSION};

#[derive(Serialize)]
struct StoreRef<'a> {
    version: &'a str,
    root: &'a Path,
    model: &'a str,
    documents: &'a [Document],
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct StoreFile {
    version: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    chunks: Vec<Chunk>,
}

/// Write the knowledge base to its store path via temp file and rename.
pub fn save(grok: &Grokker) -> Result<()> {
    let store = StoreRef {
        version: &grok.version,
        root: &grok.root,
        model: grok.model.name,
        documents: &grok.documents,
        chunks: grok.chunks.chunks(),
    };

    let tmp = tmp_path(&grok.store_path);
    let mut writer = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer(&mut writer, &store)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);
    std::fs::rename(&tmp, &grok.store_path)?;

    tracing::debug!(
        store = %grok.store_path.display(),
        documents = grok.documents.len(),
        chunks = grok.chunks.len(),
        "store saved"
    );
    Ok(())
}

/// Load the store at `path`, migrating it in memory.
///
/// The root is the store's own directory, whatever the file recorded: the
/// store may have been moved.
pub fn load_from(path: impl AsRef<Path>, runtime: Runtime) -> Result<(Grokker, MigrationReport)> {
    let path = std::path::absolute(path.as_ref())?;
    let file_name = path
        .file_name()
        .ok_or_else(|| GrokError::Input(format!("{} is not a store file", path.display())))?
        .to_owned();
    let dir = path.parent().unwrap_or_else(|| Path::new("/"));
    let root = std::fs::canonicalize(dir)?;
    let store_path = root.join(file_name);

    let buf = std::fs::read(&store_path)?;
    let mut raw: serde_json::Value = serde_json::from_slice(&buf)?;
    let report = migrations::migrate(&mut raw)?;
    if report.migrated {
        tracing::info!(from = %report.from, to = %report.to, store = %store_path.display(), "store migrated");
    }

    let file: StoreFile = serde_json::from_value(raw)?;
    let model = models::find_model(&file.model)?;
    let grok = Grokker {
        version: file.version,
        root,
        store_path,
        model,
        documents: file.documents,
        chunks: ChunkStore::from_chunks(file.chunks),
        runtime,
    };

    tracing::debug!(
        store = %grok.store_path.display(),
        documents = grok.documents.len(),
        chunks = grok.chunks.len(),
        "store loaded"
    );
    Ok((grok, report))
}

/// Look for `name` in `start` and each of its ancestors.
pub fn find_store(start: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
    let start = std::path::absolute(start.as_ref())?;
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| GrokError::StoreNotFound {
            name: name.to_string(),
            start,
        })
}

fn tmp_path(store_path: &Path) -> PathBuf {
    let mut tmp = store_path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
