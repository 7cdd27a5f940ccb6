//! OpenAI-compatible HTTP provider.
//!
//! Calls `POST {base_url}/embeddings` and `POST {base_url}/chat/completions`
//! with a blocking `reqwest` client. Transient failures are retried here,
//! not in the engine:
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, … capped at 32s)
//! - other 4xx → fail immediately
//! - network errors → retry

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{ChatMessage, ModelProvider};
use crate::config::ProviderConfig;

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, embedding_model: &str, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: embedding_model.to_string(),
            max_retries: config.max_retries,
        })
    }

    /// POST a JSON body with retry/backoff and return the parsed success body.
    fn post_json(&self, endpoint: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), %url, "retrying provider call");
                std::thread::sleep(delay);
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send();

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json().context("invalid JSON from provider");
                    }

                    let body_text = response.text().unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("provider error {status}: {body_text}"));
                        continue;
                    }
                    bail!("provider error {status}: {body_text}");
                }
                Err(e) => {
                    last_err = Some(anyhow::Error::new(e).context(format!("request to {url} failed")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("provider call failed after retries")))
    }
}

impl ModelProvider for OpenAiProvider {
    fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let json = self.post_json("embeddings", &body)?;
        let parsed: EmbeddingResponse =
            serde_json::from_value(json).context("invalid embeddings response")?;
        let embeddings = order_by_index(parsed.data);
        anyhow::ensure!(
            embeddings.len() == texts.len(),
            "provider returned {} embeddings for {} inputs",
            embeddings.len(),
            texts.len()
        );
        Ok(embeddings)
    }

    fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        tracing::debug!(model, messages = messages.len(), "chat request");
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        let json = self.post_json("chat/completions", &body)?;
        let parsed: ChatResponse =
            serde_json::from_value(json).context("invalid chat response")?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(total_tokens = usage.total_tokens, "chat usage");
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("chat response had no choices")
    }
}

/// The API documents `data` in input order but also tags each item with its
/// index; trust the index.
fn order_by_index(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_ordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let parsed: EmbeddingResponse = serde_json::from_value(json).unwrap();
        let ordered = order_by_index(parsed.data);
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn chat_response_parses_assistant_message() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"total_tokens": 12}
        });
        let parsed: ChatResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hi");
        assert_eq!(parsed.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ProviderConfig {
            base_url: "http://localhost:1234/v1/".into(),
            ..ProviderConfig::default()
        };
        let provider = OpenAiProvider::new(&config, "embed", "key".into()).unwrap();
        assert_eq!(provider.base_url, "http://localhost:1234/v1");
    }
}
