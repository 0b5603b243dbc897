//! Summary stage worker.
//!
//! Walks the job's id list from its cursor, generating and persisting
//! one field log summary per entry. The result is saved before the
//! cursor advances, so a crash replays at most the item in flight and
//! the replay lands on an idempotent upsert.

use std::time::Duration;

use tracing::info;

use crate::core::prompts;
use crate::database::{JobOps, JobRecord, JobStage, LibraryOps, PromptKind, SummaryUpsert};

use super::{
    check_control, cooldown_with_control, with_stage_retry, JobEngine, JobResult, RetryResult,
    StageOutcome,
};

/// One generation attempt: resolve catalog details, render the
/// prompt, call the text provider.
async fn generate_one(
    engine: &JobEngine,
    template: &str,
    region: &str,
    id: i64,
) -> JobResult<(crate::core::catalog::CatalogDetails, String)> {
    let details = engine.catalog().details(id).await?;
    let prompt = prompts::render_summary_prompt(template, &details, region);
    let summary = engine.text().generate_summary(&prompt).await?;
    Ok((details, summary))
}

/// Run the summary stage for a claimed job. The job must be `running`
/// with `stage = summary`.
pub async fn run_summary_stage(engine: &JobEngine, job: &JobRecord) -> JobResult<StageOutcome> {
    let db = engine.db();
    let ids = job.pokemon_ids().to_vec();
    let total = ids.len() as i64;
    let start = job.current.clamp(0, total) as usize;

    let template = prompts::resolve_prompt(db, PromptKind::Summary).await?;

    for (index, &id) in ids.iter().enumerate().skip(start) {
        let current = index as i64;

        if let Some(outcome) = check_control(db, &job.id).await? {
            return Ok(outcome);
        }

        db.set_job_progress(
            &job.id,
            JobStage::Summary,
            current,
            total,
            &format!("Generating summary for #{}...", id),
        )
        .await?;

        let label = format!("summary for #{}", id);
        let retried = with_stage_retry(
            db,
            &job.id,
            JobStage::Summary,
            current,
            total,
            &label,
            engine.config().max_stage_retries,
            Duration::from_secs(engine.config().stage_retry_base_secs),
            || generate_one(engine, &template, &job.region, id),
        )
        .await?;

        let (details, summary) = match retried {
            RetryResult::Value(value) => value,
            RetryResult::Interrupted(outcome) => return Ok(outcome),
        };

        db.upsert_summary(&SummaryUpsert {
            id,
            name: details.name.clone(),
            summary,
            region: job.region.clone(),
            generation_id: job.generation_id,
        })
        .await?;

        db.set_job_progress(
            &job.id,
            JobStage::Summary,
            current + 1,
            total,
            &format!("Saved summary for #{}", id),
        )
        .await?;

        info!(job_id = %job.id, id, progress = current + 1, total, "Saved summary");

        if current + 1 < total {
            let base = Duration::from_secs(engine.config().summary_cooldown_secs);
            if let Some(outcome) = cooldown_with_control(db, &job.id, base).await? {
                return Ok(outcome);
            }
        }
    }

    Ok(StageOutcome::Completed)
}
