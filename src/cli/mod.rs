pub mod documents;
pub mod models;
pub mod query;
pub mod tokenizer;

use anyhow::{Context, Result};
use std::io::Read;
use std::sync::Arc;

use grokker::config::GrokConfig;
use grokker::knowledge::{Grokker, Runtime};
use grokker::tokenizer::HfTokenizer;

/// Build the provider and tokenizer the knowledge base runs with.
pub fn runtime(config: &GrokConfig) -> Result<Runtime> {
    let tokenizer = HfTokenizer::from_file(config.resolved_tokenizer_path())?;
    let provider = grokker::provider::create_provider(config)?;
    Ok(Runtime::new(Arc::from(provider), Arc::new(tokenizer))
        .with_embedding_limits(config.embedding.token_limit, config.embedding.parallelism))
}

/// Find and load the store governing the current directory.
pub fn open(config: &GrokConfig) -> Result<Grokker> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let store_path = grokker::db::find_store(&cwd, &config.store.file_name)?;
    let (grok, report) = Grokker::load(&store_path, runtime(config)?)
        .with_context(|| format!("failed to load {}", store_path.display()))?;

    if report.migrated {
        eprintln!("migrated store from {} to {}", report.from, report.to);
        grok.save()?;
    }
    Ok(grok)
}

/// Open the store and pick up edits made since it was last saved.
pub fn open_fresh(config: &GrokConfig) -> Result<Grokker> {
    let mut grok = open(config)?;
    if grok.update_embeddings()? {
        grok.save()?;
    }
    Ok(grok)
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    Ok(input)
}
