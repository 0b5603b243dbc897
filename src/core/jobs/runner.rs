//! Job runner.
//!
//! Process-wide scheduler: a 1 s tick claims queued jobs subject to
//! per-stage concurrency caps and drives each one through its stage
//! pipeline on its own task. The runner owns only transient handles;
//! every observable fact about a job lives in the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::database::{JobMode, JobOps, JobRecord, JobStage, JobStatus, StoreError};

use super::{audio_stage, summary_stage, JobEngine, JobResult, StageOutcome};

/// Tick interval for the claim loop.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

static RUNNER: OnceLock<Arc<JobRunner>> = OnceLock::new();

type HandleMap = Arc<Mutex<HashMap<String, tokio::task::JoinHandle<()>>>>;

/// The singleton scheduler.
pub struct JobRunner {
    engine: Arc<JobEngine>,
    handles: HandleMap,
}

impl JobRunner {
    /// Start the process-wide runner. The first call spawns the tick
    /// loop; later calls return the existing instance.
    pub fn start(engine: Arc<JobEngine>) -> Arc<JobRunner> {
        RUNNER
            .get_or_init(|| {
                let runner = Arc::new(JobRunner {
                    engine,
                    handles: Arc::new(Mutex::new(HashMap::new())),
                });

                let tick_runner = runner.clone();
                tokio::spawn(async move {
                    tick_runner.run_loop().await;
                });

                info!("Job runner started");
                runner
            })
            .clone()
    }

    /// Construct a runner without registering it as the process
    /// singleton and without a tick loop. Tests drive [`Self::tick`]
    /// by hand.
    pub fn detached(engine: Arc<JobEngine>) -> Arc<JobRunner> {
        Arc::new(JobRunner {
            engine,
            handles: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    async fn run_loop(&self) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(err) = self.tick().await {
                error!(error = %err, "Scheduler tick failed");
            }
        }
    }

    /// One scheduling pass: claim at most one eligible queued job and
    /// dispatch it.
    pub async fn tick(&self) -> JobResult<()> {
        let db = self.engine.db();
        let config = self.engine.config();

        let summary_running = db.count_running_by_stage(JobStage::Summary).await?;
        let audio_running = db.count_running_by_stage(JobStage::Audio).await?;

        let summary_free = (summary_running as usize) < config.max_text_jobs;
        let audio_free = (audio_running as usize) < config.max_audio_jobs;
        if !summary_free && !audio_free {
            return Ok(());
        }

        let Some(job) = db.claim_next_queued_job().await? else {
            return Ok(());
        };

        // The oldest queued job may belong to a stage whose cap is
        // already saturated; hand it back for a later tick.
        let claimed_fits = match job.stage {
            JobStage::Summary => summary_free,
            JobStage::Audio => audio_free,
        };
        if !claimed_fits {
            db.set_job_status(&job.id, JobStatus::Queued).await?;
            return Ok(());
        }

        self.dispatch(job);
        Ok(())
    }

    fn dispatch(&self, job: JobRecord) {
        let job_id = job.id.clone();
        let engine = self.engine.clone();
        let handles = self.handles.clone();

        let handle = tokio::spawn(async move {
            run_job(engine, handles, job).await;
        });

        let mut map = self.handles.lock().expect("runner handle lock poisoned");
        map.insert(job_id, handle);
    }

    /// Number of jobs this runner currently has in flight.
    pub fn active_jobs(&self) -> usize {
        let map = self.handles.lock().expect("runner handle lock poisoned");
        map.len()
    }

    /// Wait for all in-flight job tasks to finish. Used by tests.
    pub async fn join_all(&self) {
        let drained: Vec<_> = {
            let mut map = self.handles.lock().expect("runner handle lock poisoned");
            map.drain().collect()
        };
        for (_, handle) in drained {
            let _ = handle.await;
        }
    }
}

async fn run_job(engine: Arc<JobEngine>, handles: HandleMap, job: JobRecord) {
    let job_id = job.id.clone();

    if let Err(err) = run_stages(&engine, &job).await {
        let message = err.to_string();
        warn!(job_id = %job_id, error = %message, "Job failed");
        match engine.db().set_job_error(&job_id, &message).await {
            Ok(()) => {}
            Err(StoreError::IllegalTransition { from, .. }) => {
                // A control op beat us to a terminal state.
                warn!(job_id = %job_id, status = %from, "Skipped failure write on terminal job");
            }
            Err(store_err) => {
                error!(job_id = %job_id, error = %store_err, "Failed to record job error");
            }
        }
    }

    let mut map = handles.lock().expect("runner handle lock poisoned");
    map.remove(&job_id);
}

async fn run_stages(engine: &JobEngine, job: &JobRecord) -> JobResult<()> {
    let db = engine.db();

    let job = match job.stage {
        JobStage::Summary => {
            match summary_stage::run_summary_stage(engine, job).await? {
                StageOutcome::Completed => {}
                outcome => {
                    info!(job_id = %job.id, ?outcome, "Summary stage interrupted");
                    return Ok(());
                }
            }

            if job.mode == JobMode::SummaryOnly {
                db.set_job_status(&job.id, JobStatus::Completed).await?;
                info!(job_id = %job.id, "Job completed");
                return Ok(());
            }

            // Full mode continues into audio with a fresh cursor.
            db.set_job_progress(
                &job.id,
                JobStage::Audio,
                0,
                job.pokemon_ids().len() as i64,
                "Summaries done, preparing audio synthesis...",
            )
            .await?;

            db.get_job(&job.id)
                .await?
                .ok_or_else(|| StoreError::JobNotFound(job.id.clone()))?
        }
        JobStage::Audio => job.clone(),
    };

    match audio_stage::run_audio_stage(engine, &job).await? {
        StageOutcome::Completed => {
            db.set_job_status(&job.id, JobStatus::Completed).await?;
            info!(job_id = %job.id, "Job completed");
        }
        outcome => {
            info!(job_id = %job.id, ?outcome, "Audio stage interrupted");
        }
    }

    Ok(())
}
