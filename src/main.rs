use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use fieldlog::api::{self, AppState};
use fieldlog::config::AppConfig;
use fieldlog::core::catalog::PokeApiCatalog;
use fieldlog::core::jobs::{JobEngine, JobRunner};
use fieldlog::core::logging;
use fieldlog::core::providers::{GeminiTextClient, GeminiTtsClient};
use fieldlog::database::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("FIELDLOG_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    let data_dir = config.data.resolve_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let _log_guard = logging::init(&data_dir);
    tracing::info!(version = fieldlog::VERSION, "Field log engine starting");

    // Job execution cannot work without provider credentials; fail
    // loudly at startup instead of on the first claimed job.
    let api_key = std::env::var("GEMINI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty())
        .context("GEMINI_API_KEY is not set")?;

    let db = Database::open(&config.data.resolve_database_path())
        .await
        .context("opening database")?;

    let timeout = Duration::from_secs(config.providers.request_timeout_secs);
    let text = GeminiTextClient::new(
        api_key.clone(),
        config.providers.text_model.clone(),
        timeout,
    )
    .context("building text client")?;
    let tts = GeminiTtsClient::new(api_key, config.providers.tts_model.clone(), timeout)
        .context("building TTS client")?;
    let catalog = PokeApiCatalog::new(timeout).context("building catalog client")?;

    let engine = Arc::new(JobEngine::new(
        db.clone(),
        Arc::new(text),
        Arc::new(tts),
        Arc::new(catalog),
        config.engine.clone(),
    ));

    JobRunner::start(engine);

    let state = AppState {
        db,
        stalled_threshold_ms: config.engine.stalled_threshold_ms,
    };
    api::serve(state, config.server.bind_addr).await
}
