use anyhow::{Context, Result};
use std::path::PathBuf;

use grokker::config::GrokConfig;
use grokker::knowledge::Grokker;

/// Create a store in the current directory.
pub fn init(config: &GrokConfig, model: Option<&str>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let model = model.unwrap_or(&config.model.default);
    let grok = Grokker::init_named(&cwd, &config.store.file_name, model, super::runtime(config)?)?;
    println!(
        "Initialized {} (model {})",
        grok.store_path().display(),
        grok.model().name
    );
    Ok(())
}

pub fn add(config: &GrokConfig, paths: &[PathBuf]) -> Result<()> {
    let mut grok = super::open(config)?;
    for path in paths {
        eprintln!("adding {}", path.display());
        grok.add_document(path)
            .with_context(|| format!("failed to add {}", path.display()))?;
        // Persist each document's embeddings as soon as they exist.
        grok.save()?;
    }
    Ok(())
}

pub fn forget(config: &GrokConfig, paths: &[PathBuf]) -> Result<()> {
    let mut grok = super::open(config)?;
    for path in paths {
        if grok.forget_document(path)? {
            eprintln!("forgot {}", path.display());
        } else {
            eprintln!("not tracked: {}", path.display());
        }
    }
    grok.save()?;
    Ok(())
}

pub fn ls(config: &GrokConfig) -> Result<()> {
    let grok = super::open(config)?;
    for doc in grok.list_documents() {
        println!("{doc}");
    }
    Ok(())
}

pub fn refresh(config: &GrokConfig) -> Result<()> {
    let mut grok = super::open(config)?;
    grok.refresh_embeddings()?;
    grok.save()?;
    println!(
        "{} documents, {} chunks",
        grok.documents().len(),
        grok.chunks().len()
    );
    Ok(())
}

pub fn prune(config: &GrokConfig) -> Result<()> {
    let mut grok = super::open(config)?;
    let removed = grok.prune_orphans();
    grok.save()?;
    println!("Removed {removed} orphaned chunks");
    Ok(())
}

pub fn version(config: &GrokConfig) -> Result<()> {
    let grok = super::open(config)?;
    println!("code:  {}", grok.code_version());
    println!("store: {}", grok.store_version());
    println!(
        "saved: {}",
        grok.store_mtime()?.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
