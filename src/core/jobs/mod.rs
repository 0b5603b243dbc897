//! Durable job engine.
//!
//! A job walks a list of Pokedex ids through up to two stages: summary
//! generation and audio synthesis. All durable state lives in the
//! store; workers poll it at every suspension point so pause, cancel,
//! and stalled-job recovery take effect within about a second.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

use crate::config::EngineConfig;
use crate::core::catalog::{CatalogError, CatalogSource};
use crate::core::providers::{ProviderError, TextProvider, TtsProvider};
use crate::database::{Database, JobOps, JobStage, JobStatus, StoreError};

pub mod audio_stage;
pub mod runner;
pub mod summary_stage;

pub use runner::JobRunner;

// ============================================================================
// Error Types
// ============================================================================

/// Closed error set for job execution. Retry classification is
/// explicit: only transient provider and catalog failures are worth a
/// second attempt, everything else fails the job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    MissingPrecondition(String),

    #[error("Invalid job state: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    /// Whether the stage worker's outer retry should try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Provider(err) => err.is_retryable(),
            JobError::Catalog(CatalogError::Network(_)) => true,
            _ => false,
        }
    }
}

pub type JobResult<T> = std::result::Result<T, JobError>;

// ============================================================================
// Stage Outcomes
// ============================================================================

/// How a stage worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every item in the stage is done.
    Completed,
    /// A pause request was observed; the control op already set the
    /// status, the worker just stopped.
    Paused,
    /// A cancel request was observed (or the job vanished).
    Canceled,
    /// The job was recovered or re-queued out from under this worker;
    /// exit without touching the record.
    Yanked,
}

// ============================================================================
// Engine Context
// ============================================================================

/// Shared context handed to stage workers: the store, the provider
/// clients, the catalog, and the tuning knobs.
pub struct JobEngine {
    db: Database,
    text: Arc<dyn TextProvider>,
    tts: Arc<dyn TtsProvider>,
    catalog: Arc<dyn CatalogSource>,
    config: EngineConfig,
}

impl JobEngine {
    pub fn new(
        db: Database,
        text: Arc<dyn TextProvider>,
        tts: Arc<dyn TtsProvider>,
        catalog: Arc<dyn CatalogSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            text,
            tts,
            catalog,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn text(&self) -> &dyn TextProvider {
        self.text.as_ref()
    }

    pub fn tts(&self) -> &dyn TtsProvider {
        self.tts.as_ref()
    }

    pub fn catalog(&self) -> &dyn CatalogSource {
        self.catalog.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

// ============================================================================
// Control Polling
// ============================================================================

/// Poll the store for a control decision on a supposedly-running job.
/// Returns `None` when the worker should keep going.
pub(crate) async fn check_control(db: &Database, job_id: &str) -> JobResult<Option<StageOutcome>> {
    let Some(job) = db.get_job(job_id).await? else {
        // Deleted while running; nothing left to update.
        return Ok(Some(StageOutcome::Canceled));
    };

    match job.status {
        JobStatus::Running => Ok(None),
        JobStatus::Paused => Ok(Some(StageOutcome::Paused)),
        JobStatus::Canceled => Ok(Some(StageOutcome::Canceled)),
        // Recovered to queued (or otherwise terminal) while this
        // worker still held it: another run will pick it up.
        JobStatus::Queued => Ok(Some(StageOutcome::Yanked)),
        JobStatus::Completed | JobStatus::Failed => Ok(Some(StageOutcome::Yanked)),
    }
}

/// Sleep `duration` in one second slices, polling job control between
/// slices. Returns the control outcome if one arrived mid-sleep.
pub(crate) async fn sleep_with_control(
    db: &Database,
    job_id: &str,
    duration: Duration,
) -> JobResult<Option<StageOutcome>> {
    const SLICE: Duration = Duration::from_secs(1);

    let mut remaining = duration;
    while !remaining.is_zero() {
        let slice = remaining.min(SLICE);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);

        if let Some(outcome) = check_control(db, job_id).await? {
            return Ok(Some(outcome));
        }
    }
    Ok(None)
}

/// Multiply a base duration by a uniform factor in [0.8, 1.2).
pub(crate) fn jitter(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..1.2);
    base.mul_f64(factor)
}

/// Record a durable cooldown, sleep it off in slices, then clear it.
/// The control outcome is returned if pause or cancel interrupted the
/// wait; the control op itself already cleared the cooldown then.
pub(crate) async fn cooldown_with_control(
    db: &Database,
    job_id: &str,
    base: Duration,
) -> JobResult<Option<StageOutcome>> {
    let wait = jitter(base);
    let until = chrono::Utc::now()
        + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::seconds(0));

    db.set_job_cooldown_until(job_id, Some(until)).await?;

    if let Some(outcome) = sleep_with_control(db, job_id, wait).await? {
        return Ok(Some(outcome));
    }

    db.set_job_cooldown_until(job_id, None).await?;
    Ok(None)
}

// ============================================================================
// Outer Retry
// ============================================================================

/// Result of a retried operation: either the value, or the control
/// outcome that interrupted a backoff wait.
pub(crate) enum RetryResult<T> {
    Value(T),
    Interrupted(StageOutcome),
}

/// Retry `op` up to `max_retries` times with a doubling backoff,
/// honoring job control at every wait boundary. Non-retryable errors
/// (and exhaustion) surface to the caller, which fails the job.
///
/// The retry writes a progress message before each new attempt so
/// `updated_at` keeps advancing and stalled-job recovery leaves the
/// job alone.
pub(crate) async fn with_stage_retry<T, F, Fut>(
    db: &Database,
    job_id: &str,
    stage: JobStage,
    current: i64,
    total: i64,
    label: &str,
    max_retries: u32,
    base: Duration,
    mut op: F,
) -> JobResult<RetryResult<T>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = JobResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(RetryResult::Value(value)),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                let delay = base * 2u32.pow(attempt - 1);
                warn!(
                    job_id,
                    attempt,
                    max_retries,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Stage operation failed, retrying"
                );

                attempt += 1;
                db.set_job_progress(
                    job_id,
                    stage,
                    current,
                    total,
                    &format!("Retrying {} (attempt {}/{})...", label, attempt, max_retries),
                )
                .await?;

                if let Some(outcome) = sleep_with_control(db, job_id, delay).await? {
                    return Ok(RetryResult::Interrupted(outcome));
                }
            }
            Err(err) => return Err(err),
        }
    }
}
