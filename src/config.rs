use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GrokConfig {
    pub log: LogConfig,
    pub store: StoreConfig,
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub provider: ProviderConfig,
    pub tokenizer: TokenizerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// File name of the store, created in the knowledge-base root.
    pub file_name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Chat model used by `grok init` when none is given.
    pub default: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Maximum total tokens per embedding request.
    pub token_limit: usize,
    /// Maximum number of embedding requests in flight at once.
    pub parallelism: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TokenizerConfig {
    pub path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_name: ".grok".into(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: crate::models::DEFAULT_MODEL.into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".into(),
            token_limit: 8192,
            parallelism: 4,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            path: default_grok_dir()
                .join("tokenizer.json")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

/// Returns the per-user configuration directory, e.g. `~/.config/grokker/`.
pub fn default_grok_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("grokker")
}

/// Returns the default config file path: `<config_dir>/grokker/config.toml`
pub fn default_config_path() -> PathBuf {
    default_grok_dir().join("config.toml")
}

impl GrokConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            GrokConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (GROK_LOG_LEVEL, GROK_MODEL, GROK_TOKENIZER, GROK_BASE_URL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GROK_LOG_LEVEL") {
            self.log.level = val;
        }
        if let Ok(val) = std::env::var("GROK_MODEL") {
            self.model.default = val;
        }
        if let Ok(val) = std::env::var("GROK_TOKENIZER") {
            self.tokenizer.path = val;
        }
        if let Ok(val) = std::env::var("GROK_BASE_URL") {
            self.provider.base_url = val;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.embedding.token_limit > 0,
            "embedding.token_limit must be > 0"
        );
        anyhow::ensure!(!self.store.file_name.is_empty(), "store.file_name must not be empty");
        Ok(())
    }

    /// Resolve the tokenizer path, expanding `~` if needed.
    pub fn resolved_tokenizer_path(&self) -> PathBuf {
        expand_tilde(&self.tokenizer.path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GrokConfig::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.store.file_name, ".grok");
        assert_eq!(config.embedding.token_limit, 8192);
        assert!(config.tokenizer.path.ends_with("tokenizer.json"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[log]
level = "debug"

[embedding]
token_limit = 2048

[provider]
base_url = "http://localhost:8080/v1"
"#;
        let config: GrokConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.embedding.token_limit, 2048);
        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
        // defaults still apply for unset fields
        assert_eq!(config.embedding.parallelism, 4);
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn zero_token_limit_is_rejected() {
        let config: GrokConfig = toml::from_str("[embedding]\ntoken_limit = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = GrokConfig::default();
        std::env::set_var("GROK_LOG_LEVEL", "trace");
        std::env::set_var("GROK_TOKENIZER", "/tmp/tok.json");

        config.apply_env_overrides();

        assert_eq!(config.log.level, "trace");
        assert_eq!(config.tokenizer.path, "/tmp/tok.json");

        // Clean up
        std::env::remove_var("GROK_LOG_LEVEL");
        std::env::remove_var("GROK_TOKENIZER");
    }
}
