//! Upstream provider clients.
//!
//! Thin wrappers around the Gemini text and TTS endpoints with
//! classified errors and bounded retry. The clients are pure I/O: they
//! never touch the store or the job record.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

pub mod text;
pub mod tts;

pub use text::{GeminiTextClient, TextProvider};
pub use tts::{GeminiTtsClient, TtsAudio, TtsProvider};

// ============================================================================
// Error Types
// ============================================================================

/// Provider errors, classified so callers can tell retryable failures
/// from contract violations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Quota exhaustion: HTTP 429 or an explicit resource-exhausted
    /// body. Retried on a long backoff.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Transient upstream failure: HTTP 500/503 or an overloaded body.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Network-level failure (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-retryable HTTP error (bad request, auth, not found).
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider answered but violated its contract (missing or
    /// empty payload). Never retried.
    #[error("Provider contract violation: {0}")]
    Contract(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Transient(_) | ProviderError::Network(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }

    /// Classify a non-success HTTP response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let lowered = body.to_lowercase();
        if status == 429 || lowered.contains("resource exhausted") || lowered.contains("resource_exhausted") {
            return ProviderError::RateLimited(truncate(body));
        }
        if status == 500 || status == 503 || lowered.contains("overloaded") {
            return ProviderError::Transient(truncate(body));
        }
        ProviderError::Api {
            status,
            message: truncate(body),
        }
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

// ============================================================================
// Backoff
// ============================================================================

const BACKOFF_BASE_SECS: f64 = 1.0;
const BACKOFF_CAP_SECS: f64 = 64.0;
const RATE_LIMIT_BASE_SECS: f64 = 15.0;
const RATE_LIMIT_CAP_SECS: f64 = 120.0;

/// Delay before retry `attempt` (1-based), doubling from a per-class
/// base with multiplicative jitter. Rate-limit failures back off much
/// longer than plain transients.
pub fn backoff_delay(error: &ProviderError, attempt: u32) -> Duration {
    let (base, cap) = if error.is_rate_limited() {
        (RATE_LIMIT_BASE_SECS, RATE_LIMIT_CAP_SECS)
    } else {
        (BACKOFF_BASE_SECS, BACKOFF_CAP_SECS)
    };

    let exp = base * 2f64.powi(attempt.saturating_sub(1) as i32);
    let capped = exp.min(cap);
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_secs_f64(capped * jitter)
}

/// Run `op` up to `max_attempts` times, sleeping a classified backoff
/// between retryable failures. Non-retryable errors surface at once.
pub(crate) async fn with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ProviderResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(&err, attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %err,
                    "Provider call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
