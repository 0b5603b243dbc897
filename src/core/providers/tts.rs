//! Gemini TTS client.
//!
//! Requests spoken audio for a combined prompt and returns the raw PCM
//! payload. Gemini answers with base64 `inlineData` whose mime type
//! carries the sample rate (`audio/L16;codec=pcm;rate=24000`).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::json;

use super::{with_retry, ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Attempts the client makes on its own before giving up. The TTS
/// quota is the scarcer resource, so it gets one more try than text.
const MAX_ATTEMPTS: u32 = 5;

const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Raw synthesis result: 16-bit signed little-endian mono PCM.
#[derive(Debug, Clone)]
pub struct TtsAudio {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
}

/// Speech synthesis backend.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn generate_tts(&self, text: &str, voice: &str) -> ProviderResult<TtsAudio>;
}

/// Gemini TTS endpoint client (API key-based).
pub struct GeminiTtsClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiTtsClient {
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

    async fn request_tts(&self, text: &str, voice: &str) -> ProviderResult<TtsAudio> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": text }]
            }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice }
                    }
                }
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

        let inline = json["candidates"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|c| c["content"]["parts"].as_array())
            .and_then(|parts| parts.first())
            .and_then(|p| p.get("inlineData"))
            .ok_or_else(|| ProviderError::Contract("Missing inline audio data".to_string()))?;

        let data = inline["data"].as_str().unwrap_or_default();
        if data.is_empty() {
            return Err(ProviderError::Contract("Empty audio payload".to_string()));
        }

        let pcm = BASE64
            .decode(data)
            .map_err(|e| ProviderError::Contract(format!("Invalid audio base64: {}", e)))?;

        if pcm.is_empty() {
            return Err(ProviderError::Contract("Empty audio payload".to_string()));
        }

        let sample_rate = inline["mimeType"]
            .as_str()
            .and_then(parse_rate_from_mime)
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        Ok(TtsAudio { pcm, sample_rate })
    }
}

#[async_trait]
impl TtsProvider for GeminiTtsClient {
    async fn generate_tts(&self, text: &str, voice: &str) -> ProviderResult<TtsAudio> {
        with_retry(MAX_ATTEMPTS, || self.request_tts(text, voice)).await
    }
}

/// Pull the `rate=` parameter out of a mime type like
/// `audio/L16;codec=pcm;rate=24000`.
fn parse_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("rate="))
        .and_then(|rate| rate.parse().ok())
}
