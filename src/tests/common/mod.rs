//! Shared test fixtures: fake providers, a fake catalog, PCM
//! builders, and an engine factory wired to in-memory SQLite.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::core::catalog::{CatalogDetails, CatalogResult, CatalogSource};
use crate::core::jobs::JobEngine;
use crate::core::prompts::TTS_PAUSE_MARKER;
use crate::core::providers::{ProviderError, ProviderResult, TextProvider, TtsAudio, TtsProvider};
use crate::database::Database;

pub const TEST_SAMPLE_RATE: u32 = 24_000;

// ============================================================================
// PCM Builders
// ============================================================================

/// 1 kHz tone at a comfortable amplitude.
pub fn tone_pcm(secs: f64) -> Vec<u8> {
    let count = (secs * TEST_SAMPLE_RATE as f64) as usize;
    let mut out = Vec::with_capacity(count * 2);
    for i in 0..count {
        let t = i as f64 / TEST_SAMPLE_RATE as f64;
        let sample = (8_000.0 * (2.0 * std::f64::consts::PI * 1_000.0 * t).sin()) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

pub fn silence_pcm(secs: f64) -> Vec<u8> {
    vec![0u8; ((secs * TEST_SAMPLE_RATE as f64) as usize) * 2]
}

// ============================================================================
// Fake Providers
// ============================================================================

/// Text provider returning canned summaries, optionally failing its
/// first calls with a transient error.
pub struct FakeTextProvider {
    calls: AtomicUsize,
    fail_first: usize,
}

impl FakeTextProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        }
    }

    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextProvider for FakeTextProvider {
    async fn generate_summary(&self, prompt: &str) -> ProviderResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ProviderError::Transient("fake overload".to_string()));
        }
        Ok(format!("A calm specimen was sighted. ({})", prompt.len()))
    }
}

/// TTS provider synthesizing one tone per entry with clean 2.5 s gaps,
/// so the real splitter has real silences to find.
pub struct FakeTtsProvider {
    calls: AtomicUsize,
    fail_first: usize,
}

impl FakeTtsProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        }
    }

    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TtsProvider for FakeTtsProvider {
    async fn generate_tts(&self, text: &str, _voice: &str) -> ProviderResult<TtsAudio> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ProviderError::Transient("fake overload".to_string()));
        }

        let entries = text.matches(TTS_PAUSE_MARKER.trim()).count() + 1;
        let mut pcm = Vec::new();
        for index in 0..entries {
            if index > 0 {
                pcm.extend_from_slice(&silence_pcm(2.5));
            }
            pcm.extend_from_slice(&tone_pcm(1.0));
        }

        Ok(TtsAudio {
            pcm,
            sample_rate: TEST_SAMPLE_RATE,
        })
    }
}

/// Catalog returning synthetic details for any id.
pub struct FakeCatalog;

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn details(&self, id: i64) -> CatalogResult<CatalogDetails> {
        Ok(CatalogDetails {
            id,
            name: format!("mon-{}", id),
            genus: "Test Pokemon".to_string(),
            flavor_text: "Seen only in test fixtures.".to_string(),
            types: vec!["normal".to_string()],
            habitat: Some("laboratory".to_string()),
        })
    }
}

// ============================================================================
// Engine Factory
// ============================================================================

/// Engine config with no pacing so tests run fast.
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        summary_cooldown_secs: 0,
        audio_cooldown_secs: 0,
        stage_retry_base_secs: 0,
        ..EngineConfig::default()
    }
}

pub async fn test_db() -> Database {
    Database::open_in_memory().await.expect("in-memory database")
}

pub struct TestEngine {
    pub db: Database,
    pub engine: Arc<JobEngine>,
    pub text: Arc<FakeTextProvider>,
    pub tts: Arc<FakeTtsProvider>,
}

/// Build an engine around fakes. The provider handles are returned so
/// tests can assert on call counts.
pub async fn test_engine_with(
    text: FakeTextProvider,
    tts: FakeTtsProvider,
    config: EngineConfig,
) -> TestEngine {
    let db = test_db().await;
    let text = Arc::new(text);
    let tts = Arc::new(tts);

    let engine = Arc::new(JobEngine::new(
        db.clone(),
        text.clone(),
        tts.clone(),
        Arc::new(FakeCatalog),
        config,
    ));

    TestEngine {
        db,
        engine,
        text,
        tts,
    }
}

pub async fn test_engine() -> TestEngine {
    test_engine_with(
        FakeTextProvider::new(),
        FakeTtsProvider::new(),
        fast_engine_config(),
    )
    .await
}
