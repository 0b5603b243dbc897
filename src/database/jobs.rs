//! Job store operations.
//!
//! Provides atomic job claiming and guarded status transitions on top
//! of SQLite. Claims run inside a transaction around SELECT + UPDATE so
//! each queued job is handed to exactly one scheduler tick; status
//! writes re-read the row inside the same transaction and refuse
//! illegal transitions.

use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use tracing::info;
use uuid::Uuid;

use super::models::{JobRecord, JobStage, JobStatus, NewJob};
use super::{Database, StoreError, StoreResult};

/// Extension trait for job-related database operations.
pub trait JobOps {
    fn create_job(&self, input: &NewJob) -> impl std::future::Future<Output = StoreResult<JobRecord>> + Send;
    fn get_job(&self, id: &str) -> impl std::future::Future<Output = StoreResult<Option<JobRecord>>> + Send;
    fn list_jobs(&self) -> impl std::future::Future<Output = StoreResult<Vec<JobRecord>>> + Send;

    /// Atomically claim the oldest queued job, flipping it to running.
    fn claim_next_queued_job(&self) -> impl std::future::Future<Output = StoreResult<Option<JobRecord>>> + Send;

    fn set_job_progress(
        &self,
        id: &str,
        stage: JobStage,
        current: i64,
        total: i64,
        message: &str,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    fn set_job_cooldown_until(
        &self,
        id: &str,
        until: Option<DateTime<Utc>>,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Transition a job's status, enforcing the lifecycle state machine.
    fn set_job_status(&self, id: &str, status: JobStatus) -> impl std::future::Future<Output = StoreResult<JobRecord>> + Send;

    /// Mark a job failed with an error message.
    fn set_job_error(&self, id: &str, message: &str) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    // Control-plane wrappers
    fn pause_job(&self, id: &str) -> impl std::future::Future<Output = StoreResult<JobRecord>> + Send;
    fn resume_job(&self, id: &str) -> impl std::future::Future<Output = StoreResult<JobRecord>> + Send;
    fn cancel_job(&self, id: &str) -> impl std::future::Future<Output = StoreResult<JobRecord>> + Send;

    /// Pause every pausable (queued or running) job. Returns the count.
    fn pause_all_jobs(&self) -> impl std::future::Future<Output = StoreResult<u64>> + Send;
    /// Cancel every non-terminal job. Returns the count.
    fn cancel_all_jobs(&self) -> impl std::future::Future<Output = StoreResult<u64>> + Send;

    /// Return running jobs whose `updated_at` is older than the
    /// threshold to the queue. Returns the count.
    fn recover_stalled_jobs(&self, threshold_ms: i64) -> impl std::future::Future<Output = StoreResult<u64>> + Send;

    fn count_running_by_stage(&self, stage: JobStage) -> impl std::future::Future<Output = StoreResult<i64>> + Send;
}

impl JobOps for Database {
    async fn create_job(&self, input: &NewJob) -> StoreResult<JobRecord> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let stage = input.mode.initial_stage();
        let total = input.pokemon_ids.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, mode, generation_id, region, voice, pokemon_ids,
                total, "current", stage, status, message, cooldown_until, error,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, 'Queued', NULL, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(input.mode)
        .bind(input.generation_id)
        .bind(&input.region)
        .bind(&input.voice)
        .bind(Json(&input.pokemon_ids))
        .bind(total)
        .bind(stage)
        .bind(JobStatus::Queued)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        info!(job_id = %id, mode = %input.mode, ids = total, "Created job");

        self.get_job(&id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(id))
    }

    async fn get_job(&self, id: &str) -> StoreResult<Option<JobRecord>> {
        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(job)
    }

    async fn list_jobs(&self) -> StoreResult<Vec<JobRecord>> {
        let jobs = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs ORDER BY created_at DESC")
            .fetch_all(self.pool())
            .await?;
        Ok(jobs)
    }

    async fn claim_next_queued_job(&self) -> StoreResult<Option<JobRecord>> {
        let mut tx = self.pool().begin().await?;

        let job_id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM jobs
            WHERE status = 'queued'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job_id) = job_id else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = Utc::now();
        let rows_affected = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running', cooldown_until = NULL, updated_at = ?
            WHERE id = ? AND status = 'queued'
            "#,
        )
        .bind(now)
        .bind(&job_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Claimed by a concurrent tick between SELECT and UPDATE
            tx.commit().await?;
            return Ok(None);
        }

        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = ?")
            .bind(&job_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(job_id = %job.id, stage = %job.stage, "Claimed job");

        Ok(Some(job))
    }

    async fn set_job_progress(
        &self,
        id: &str,
        stage: JobStage,
        current: i64,
        total: i64,
        message: &str,
    ) -> StoreResult<()> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET stage = ?, "current" = ?, total = ?, message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(stage)
        .bind(current)
        .bind(total)
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(StoreError::JobNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_job_cooldown_until(
        &self,
        id: &str,
        until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        // Setting a cooldown is only meaningful on a running job; a
        // control op may have taken the record between the worker's
        // writes, and its cleared cooldown must stay cleared.
        let rows = if until.is_some() {
            sqlx::query(
                "UPDATE jobs SET cooldown_until = ?, updated_at = ? WHERE id = ? AND status = 'running'",
            )
            .bind(until)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected()
        } else {
            sqlx::query("UPDATE jobs SET cooldown_until = NULL, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool())
                .await?
                .rows_affected()
        };

        if rows == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_one(self.pool())
                .await?;
            if exists == 0 {
                return Err(StoreError::JobNotFound(id.to_string()));
            }
            // Not running anymore: the cooldown write is obsolete.
        }
        Ok(())
    }

    async fn set_job_status(&self, id: &str, status: JobStatus) -> StoreResult<JobRecord> {
        let mut tx = self.pool().begin().await?;

        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;

        if !job.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                from: job.status,
                to: status,
            });
        }

        // Leaving `running` always drops any pending cooldown.
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, cooldown_until = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(job_id = %id, from = %job.status, to = %status, "Job status changed");

        Ok(updated)
    }

    async fn set_job_error(&self, id: &str, message: &str) -> StoreResult<()> {
        let mut tx = self.pool().begin().await?;

        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;

        if !job.status.can_transition_to(JobStatus::Failed) {
            return Err(StoreError::IllegalTransition {
                from: job.status,
                to: JobStatus::Failed,
            });
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error = ?, cooldown_until = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(job_id = %id, error = message, "Job failed");

        Ok(())
    }

    async fn pause_job(&self, id: &str) -> StoreResult<JobRecord> {
        self.set_job_status(id, JobStatus::Paused).await
    }

    async fn resume_job(&self, id: &str) -> StoreResult<JobRecord> {
        self.set_job_status(id, JobStatus::Queued).await
    }

    async fn cancel_job(&self, id: &str) -> StoreResult<JobRecord> {
        self.set_job_status(id, JobStatus::Canceled).await
    }

    async fn pause_all_jobs(&self) -> StoreResult<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'paused', cooldown_until = NULL, updated_at = ?
            WHERE status IN ('queued', 'running')
            "#,
        )
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .rows_affected();

        info!(count = rows, "Paused all active jobs");
        Ok(rows)
    }

    async fn cancel_all_jobs(&self) -> StoreResult<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'canceled', cooldown_until = NULL, updated_at = ?
            WHERE status IN ('queued', 'running', 'paused')
            "#,
        )
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .rows_affected();

        info!(count = rows, "Canceled all active jobs");
        Ok(rows)
    }

    async fn recover_stalled_jobs(&self, threshold_ms: i64) -> StoreResult<u64> {
        let cutoff = Utc::now() - Duration::milliseconds(threshold_ms);

        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', cooldown_until = NULL, message = 'Recovered', updated_at = ?
            WHERE status = 'running' AND updated_at < ?
            "#,
        )
        .bind(Utc::now())
        .bind(cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows > 0 {
            info!(count = rows, threshold_ms, "Recovered stalled jobs");
        }
        Ok(rows)
    }

    async fn count_running_by_stage(&self, stage: JobStage) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'running' AND stage = ?")
                .bind(stage)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }
}
