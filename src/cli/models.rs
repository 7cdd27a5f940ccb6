use anyhow::Result;

use grokker::config::GrokConfig;

/// List known chat models, marking the active one.
pub fn list(config: &GrokConfig) -> Result<()> {
    let grok = super::open(config)?;
    let active = grok.model().name;
    for model in grok.list_models() {
        let marker = if model.name == active { "*" } else { " " };
        println!("{marker} {:<16} {:>7} tokens", model.name, model.token_limit);
    }
    Ok(())
}

/// Switch the store's chat model.
pub fn set(config: &GrokConfig, name: &str) -> Result<()> {
    let mut grok = super::open(config)?;
    let previous = grok.set_model(name)?;
    grok.save()?;
    println!("Switched model from {previous} to {}", grok.model().name);
    Ok(())
}
