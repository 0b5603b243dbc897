use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level application configuration.
///
/// Loaded from an optional TOML file with every section defaulted, then
/// overlaid with environment variables. API credentials are NOT stored
/// here; they are read from the environment at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub providers: ProviderConfig,
    pub engine: EngineConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the control API binds to.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".parse().expect("valid default bind addr"),
        }
    }
}

/// Data directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Override the default data directory.
    pub data_dir: Option<PathBuf>,
    /// Override the SQLite database path. Defaults to `fieldlog.db`
    /// inside the data directory.
    pub database_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_path: None,
        }
    }
}

impl DataConfig {
    /// Resolve the data directory, creating a platform default when not
    /// overridden.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fieldlog")
    }

    /// Resolve the SQLite database path.
    pub fn resolve_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        self.resolve_data_dir().join("fieldlog.db")
    }
}

/// Upstream provider configuration (models and timeouts, not secrets).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Gemini model used for field log text generation.
    pub text_model: String,
    /// Gemini model used for speech synthesis.
    pub tts_model: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            text_model: "gemini-2.0-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// Job engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Concurrent jobs allowed in the summary stage.
    pub max_text_jobs: usize,
    /// Concurrent jobs allowed in the audio stage.
    pub max_audio_jobs: usize,
    /// Base cooldown between summary calls, in seconds.
    pub summary_cooldown_secs: u64,
    /// Base cooldown between TTS batches, in seconds.
    pub audio_cooldown_secs: u64,
    /// Outer retry attempts a stage worker makes per item.
    pub max_stage_retries: u32,
    /// Base backoff between outer retries, in seconds (doubles per
    /// attempt).
    pub stage_retry_base_secs: u64,
    /// Character cap for a combined TTS request.
    pub tts_max_chars: usize,
    /// Entry cap for a combined TTS request.
    pub tts_max_batch_size: usize,
    /// Age after which a running job is considered stalled, in ms.
    pub stalled_threshold_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_text_jobs: 3,
            max_audio_jobs: 1,
            summary_cooldown_secs: 15,
            audio_cooldown_secs: 300,
            max_stage_retries: 3,
            stage_retry_base_secs: 5,
            tts_max_chars: 4000,
            tts_max_batch_size: 15,
            stalled_threshold_ms: 300_000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data: DataConfig::default(),
            providers: ProviderConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the given TOML file, falling back to
    /// defaults when the file is absent.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}
