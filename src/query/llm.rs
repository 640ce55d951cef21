use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

/// Single-turn text completion.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI chat completions, deterministic (temperature 0).
pub struct OpenAIChatProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIChatProvider {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIChatProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }]
        });

        debug!("OpenAI request: {}", serde_json::to_string_pretty(&body)?);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let response_body: Value = response.json().await?;

        if let Some(error) = response_body.get("error") {
            anyhow::bail!("OpenAI API error: {}", error);
        }

        let content = response_body["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;

        Ok(content.to_string())
    }
}
