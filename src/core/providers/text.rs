//! Gemini text client.
//!
//! Calls the Generative Language API with an API key and extracts the
//! `summary` field from the model's strict-JSON reply.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{with_retry, ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Attempts the client makes on its own before giving up.
const MAX_ATTEMPTS: u32 = 4;

/// Text generation backend.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Generate one field log summary from a fully rendered prompt.
    async fn generate_summary(&self, prompt: &str) -> ProviderResult<String>;
}

/// Gemini text endpoint client (API key-based).
pub struct GeminiTextClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiTextClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: api_key.trim().to_string(),
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at a different endpoint. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_summary(&self, prompt: &str) -> ProviderResult<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json"
            }
        });

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_response(status.as_u16(), &text));
        }

        let json: serde_json::Value = resp.json().await?;

        let content = json["candidates"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|c| c["content"]["parts"].as_array())
            .and_then(|parts| parts.first())
            .and_then(|p| p["text"].as_str())
            .ok_or_else(|| ProviderError::Contract("Missing content in response".to_string()))?;

        // The model is instructed to answer {"summary": "..."} exactly.
        let parsed: serde_json::Value = serde_json::from_str(content).map_err(|e| {
            ProviderError::Contract(format!("Response is not valid JSON: {}", e))
        })?;

        let summary = parsed["summary"]
            .as_str()
            .map(str::trim)
            .unwrap_or_default();

        if summary.is_empty() {
            return Err(ProviderError::Contract(
                "Response JSON has no summary field".to_string(),
            ));
        }

        Ok(summary.to_string())
    }
}

#[async_trait]
impl TextProvider for GeminiTextClient {
    async fn generate_summary(&self, prompt: &str) -> ProviderResult<String> {
        with_retry(MAX_ATTEMPTS, || self.request_summary(prompt)).await
    }
}
