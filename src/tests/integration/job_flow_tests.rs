//! End-to-end job scenarios against fake providers: completion in
//! every mode, pause/resume, retry absorption, recovery, and the
//! audio-stage precondition.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;

use crate::core::jobs::JobRunner;
use crate::database::{
    JobMode, JobOps, JobRecord, JobStage, JobStatus, LibraryOps, NewJob, SummaryUpsert,
};
use crate::tests::common::{
    fast_engine_config, test_engine, test_engine_with, FakeTextProvider, FakeTtsProvider,
    TEST_SAMPLE_RATE,
};

fn new_job(mode: JobMode, ids: &[i64]) -> NewJob {
    NewJob::new(mode, 1, "Kanto", "Kore", ids).unwrap()
}

async fn seed_summary(db: &crate::database::Database, id: i64) {
    db.upsert_summary(&SummaryUpsert {
        id,
        name: format!("mon-{}", id),
        summary: format!("Saved field notes for specimen {}.", id),
        region: "Kanto".to_string(),
        generation_id: 1,
    })
    .await
    .unwrap();
}

/// Poll the job until `pred` holds or the timeout hits.
async fn wait_for_job<F>(db: &crate::database::Database, id: &str, pred: F) -> JobRecord
where
    F: Fn(&JobRecord) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(job) = db.get_job(id).await.unwrap() {
            if pred(&job) {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for job condition"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_summary_only_job_completes() {
    let fixture = test_engine().await;
    let runner = JobRunner::detached(fixture.engine.clone());

    let job = fixture
        .db
        .create_job(&new_job(JobMode::SummaryOnly, &[3, 1, 2, 1]))
        .await
        .unwrap();
    assert_eq!(job.pokemon_ids(), &[1, 2, 3]);
    assert_eq!(job.total, 3);

    runner.tick().await.unwrap();
    runner.join_all().await;

    let done = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.stage, JobStage::Summary);
    assert_eq!(done.current, 3);
    assert!(done.cooldown_until.is_none());

    let summaries = fixture.db.get_summaries(&[1, 2, 3]).await.unwrap();
    assert_eq!(summaries.len(), 3);
    assert_eq!(fixture.text.call_count(), 3);
    assert_eq!(fixture.tts.call_count(), 0);
}

#[tokio::test]
async fn test_full_job_produces_split_audio() {
    let fixture = test_engine().await;
    let runner = JobRunner::detached(fixture.engine.clone());

    let job = fixture
        .db
        .create_job(&new_job(JobMode::Full, &[1, 2]))
        .await
        .unwrap();

    runner.tick().await.unwrap();
    runner.join_all().await;

    let done = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.stage, JobStage::Audio);

    // Both entries came out of a single TTS call, split at the gap.
    assert_eq!(fixture.tts.call_count(), 1);

    let min_tone_bytes = (0.9 * TEST_SAMPLE_RATE as f64) as usize * 2;
    for id in [1, 2] {
        let record = fixture.db.get_audio_log(id).await.unwrap().unwrap();
        assert_eq!(record.audio_format, "pcm_s16le");
        assert_eq!(record.sample_rate, TEST_SAMPLE_RATE as i64);

        let payload = BASE64.decode(&record.audio_base64).unwrap();
        assert!(
            payload.len() >= min_tone_bytes,
            "segment for #{} too short: {} bytes",
            id,
            payload.len()
        );
    }
}

#[tokio::test]
async fn test_pause_then_resume_continues_from_cursor() {
    let mut config = fast_engine_config();
    config.summary_cooldown_secs = 3;
    let fixture = test_engine_with(FakeTextProvider::new(), FakeTtsProvider::new(), config).await;
    let runner = JobRunner::detached(fixture.engine.clone());

    let job = fixture
        .db
        .create_job(&new_job(JobMode::Full, &[1, 2, 3]))
        .await
        .unwrap();

    runner.tick().await.unwrap();

    // First summary saved, worker is now inside the 3 s cooldown.
    wait_for_job(&fixture.db, &job.id, |j| j.current == 1).await;
    fixture.db.pause_job(&job.id).await.unwrap();
    runner.join_all().await;

    let paused = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert_eq!(paused.current, 1);
    assert!(paused.cooldown_until.is_none());
    assert!(fixture.db.get_summary(1).await.unwrap().is_some());
    assert!(fixture.db.get_summary(2).await.unwrap().is_none());

    // Resume re-queues; the next tick picks it back up at the cursor.
    fixture.db.resume_job(&job.id).await.unwrap();
    runner.tick().await.unwrap();
    runner.join_all().await;

    let done = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let summaries = fixture.db.get_summaries(&[1, 2, 3]).await.unwrap();
    assert_eq!(summaries.len(), 3);
    // Each id generated exactly once across both runs.
    assert_eq!(fixture.text.call_count(), 3);
    for id in [1, 2, 3] {
        assert!(fixture.db.get_audio_log(id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_cancel_stops_processing() {
    let mut config = fast_engine_config();
    config.summary_cooldown_secs = 3;
    let fixture = test_engine_with(FakeTextProvider::new(), FakeTtsProvider::new(), config).await;
    let runner = JobRunner::detached(fixture.engine.clone());

    let job = fixture
        .db
        .create_job(&new_job(JobMode::SummaryOnly, &[1, 2]))
        .await
        .unwrap();

    runner.tick().await.unwrap();
    wait_for_job(&fixture.db, &job.id, |j| j.current == 1).await;
    fixture.db.cancel_job(&job.id).await.unwrap();
    runner.join_all().await;

    let canceled = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);
    assert_eq!(canceled.current, 1);
    assert_eq!(fixture.text.call_count(), 1);
    assert!(fixture.db.get_summary(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transient_failures_absorbed_by_outer_retry() {
    let fixture = test_engine_with(
        FakeTextProvider::failing_first(2),
        FakeTtsProvider::new(),
        fast_engine_config(),
    )
    .await;
    let runner = JobRunner::detached(fixture.engine.clone());

    let job = fixture
        .db
        .create_job(&new_job(JobMode::SummaryOnly, &[7]))
        .await
        .unwrap();

    runner.tick().await.unwrap();
    runner.join_all().await;

    let done = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.error.is_none());
    // Two failures plus the final success: three attempts in total.
    assert_eq!(fixture.text.call_count(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_job() {
    let fixture = test_engine_with(
        FakeTextProvider::failing_first(10),
        FakeTtsProvider::new(),
        fast_engine_config(),
    )
    .await;
    let runner = JobRunner::detached(fixture.engine.clone());

    let job = fixture
        .db
        .create_job(&new_job(JobMode::SummaryOnly, &[7]))
        .await
        .unwrap();

    runner.tick().await.unwrap();
    runner.join_all().await;

    let failed = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.is_some());
    assert!(failed.cooldown_until.is_none());
    assert_eq!(fixture.text.call_count(), 3);
}

#[tokio::test]
async fn test_recovered_job_resumes_from_cursor() {
    let fixture = test_engine().await;
    let runner = JobRunner::detached(fixture.engine.clone());

    let job = fixture
        .db
        .create_job(&new_job(JobMode::SummaryOnly, &[1, 2]))
        .await
        .unwrap();

    // Simulate a crashed worker: running, one summary saved, cursor
    // advanced, heartbeat gone stale.
    fixture
        .db
        .set_job_status(&job.id, JobStatus::Running)
        .await
        .unwrap();
    seed_summary(&fixture.db, 1).await;
    fixture
        .db
        .set_job_progress(&job.id, JobStage::Summary, 1, 2, "Saved summary for #1")
        .await
        .unwrap();
    let stale = Utc::now() - chrono::Duration::minutes(10);
    sqlx::query("UPDATE jobs SET updated_at = ? WHERE id = ?")
        .bind(stale)
        .bind(&job.id)
        .execute(fixture.db.pool())
        .await
        .unwrap();

    let recovered = fixture.db.recover_stalled_jobs(300_000).await.unwrap();
    assert_eq!(recovered, 1);
    let queued = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(queued.status, JobStatus::Queued);
    assert_eq!(queued.current, 1);

    runner.tick().await.unwrap();
    runner.join_all().await;

    let done = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    // Only the unfinished id was generated again.
    assert_eq!(fixture.text.call_count(), 1);
}

#[tokio::test]
async fn test_audio_only_fails_without_saved_summary() {
    let fixture = test_engine().await;
    let runner = JobRunner::detached(fixture.engine.clone());

    seed_summary(&fixture.db, 1).await;
    let job = fixture
        .db
        .create_job(&new_job(JobMode::AudioOnly, &[1, 2]))
        .await
        .unwrap();

    runner.tick().await.unwrap();
    runner.join_all().await;

    let failed = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("#2"));

    assert_eq!(fixture.tts.call_count(), 0);
    assert!(fixture.db.get_audio_log(1).await.unwrap().is_none());
    assert!(fixture.db.get_audio_log(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_audio_batching_by_count() {
    let mut config = fast_engine_config();
    config.tts_max_batch_size = 2;
    let fixture = test_engine_with(FakeTextProvider::new(), FakeTtsProvider::new(), config).await;
    let runner = JobRunner::detached(fixture.engine.clone());

    for id in [1, 2, 3] {
        seed_summary(&fixture.db, id).await;
    }
    let job = fixture
        .db
        .create_job(&new_job(JobMode::AudioOnly, &[1, 2, 3]))
        .await
        .unwrap();

    runner.tick().await.unwrap();
    runner.join_all().await;

    let done = fixture.db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    // Two batches of [1, 2] and [3]; the cursor counts batches.
    assert_eq!(done.total, 2);
    assert_eq!(done.current, 2);
    assert_eq!(fixture.tts.call_count(), 2);

    for id in [1, 2, 3] {
        assert!(fixture.db.get_audio_log(id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_audio_cap_returns_excess_claim_to_queue() {
    let mut config = fast_engine_config();
    config.audio_cooldown_secs = 2;
    config.tts_max_batch_size = 1;
    let fixture = test_engine_with(FakeTextProvider::new(), FakeTtsProvider::new(), config).await;
    let runner = JobRunner::detached(fixture.engine.clone());

    for id in [1, 2, 3] {
        seed_summary(&fixture.db, id).await;
    }
    let first = fixture
        .db
        .create_job(&new_job(JobMode::AudioOnly, &[1, 2]))
        .await
        .unwrap();
    let second = fixture
        .db
        .create_job(&new_job(JobMode::AudioOnly, &[3]))
        .await
        .unwrap();

    // First tick dispatches the first job; it now sits in the 2 s
    // inter-batch cooldown.
    runner.tick().await.unwrap();
    wait_for_job(&fixture.db, &first.id, |j| j.current == 1).await;

    // Audio cap is 1, so the second claim is handed straight back.
    runner.tick().await.unwrap();
    let returned = fixture.db.get_job(&second.id).await.unwrap().unwrap();
    assert_eq!(returned.status, JobStatus::Queued);

    runner.join_all().await;
    wait_for_job(&fixture.db, &first.id, |j| j.status == JobStatus::Completed).await;

    runner.tick().await.unwrap();
    runner.join_all().await;
    let done = fixture.db.get_job(&second.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
}
