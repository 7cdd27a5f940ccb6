use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use grokker::config::GrokConfig;

/// cl100k_base in Hugging Face `tokenizer.json` format.
const TOKENIZER_URL: &str = "https://huggingface.co/Xenova/gpt-4/resolve/main/tokenizer.json";

/// Download the tokenizer to the configured path.
pub async fn download(config: &GrokConfig, force: bool) -> Result<()> {
    let dest = config.resolved_tokenizer_path();
    if dest.exists() && !force {
        println!("Tokenizer already exists at {}", dest.display());
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    println!("Downloading tokenizer.json...");
    download_file(TOKENIZER_URL, &dest).await?;
    println!("Tokenizer saved to {}", dest.display());
    Ok(())
}

/// Stream `url` into `dest` with a progress bar. Writes to `<dest>.tmp` and
/// renames on success.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
