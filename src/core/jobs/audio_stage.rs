//! Audio stage worker.
//!
//! Groups saved summaries into combined TTS batches, synthesizes each
//! batch in one provider call, and splits the response back into
//! per-entry audio records. Batching keeps the call count inside the
//! TTS quota; the cursor counts batches, not ids.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{info, warn};

use crate::core::audio::split_pcm;
use crate::core::prompts::{self, TTS_PAUSE_MARKER};
use crate::database::{
    AudioLogUpsert, JobOps, JobRecord, JobStage, LibraryOps, PromptKind, SummaryRecord,
};

use super::{
    check_control, cooldown_with_control, with_stage_retry, JobEngine, JobError, JobResult,
    RetryResult, StageOutcome,
};

/// Stored audio format tag for raw PCM payloads.
pub const AUDIO_FORMAT_PCM: &str = "pcm_s16le";

/// One synthesis attempt for a combined batch prompt.
async fn synthesize_batch(
    engine: &JobEngine,
    prompt: &str,
    voice: &str,
) -> JobResult<crate::core::providers::TtsAudio> {
    let audio = engine.tts().generate_tts(prompt, voice).await?;
    Ok(audio)
}

/// Run the audio stage for a claimed job. The job must be `running`
/// with `stage = audio`; every id needs a saved summary.
pub async fn run_audio_stage(engine: &JobEngine, job: &JobRecord) -> JobResult<StageOutcome> {
    let db = engine.db();
    let ids = job.pokemon_ids().to_vec();

    let summaries = db.get_summaries(&ids).await?;
    for &id in &ids {
        if !summaries.iter().any(|s| s.id == id) {
            return Err(JobError::MissingPrecondition(format!(
                "Missing saved summary for #{}",
                id
            )));
        }
    }

    let batches = chunk_summaries(
        &summaries,
        engine.config().tts_max_batch_size,
        engine.config().tts_max_chars,
    );
    let total = batches.len() as i64;
    let start = job.current.clamp(0, total) as usize;

    let template = prompts::resolve_prompt(db, PromptKind::Tts).await?;

    db.set_job_progress(
        &job.id,
        JobStage::Audio,
        start as i64,
        total,
        "Starting audio synthesis...",
    )
    .await?;

    for (batch_index, batch) in batches.iter().enumerate().skip(start) {
        let current = batch_index as i64;

        if let Some(outcome) = check_control(db, &job.id).await? {
            return Ok(outcome);
        }

        let combined = batch
            .iter()
            .map(|record| spoken_entry(record))
            .collect::<Vec<_>>()
            .join(TTS_PAUSE_MARKER);
        let prompt = prompts::render_tts_prompt(&template, &combined);

        let label = format!("audio batch {}/{}", batch_index + 1, total);
        let retried = with_stage_retry(
            db,
            &job.id,
            JobStage::Audio,
            current,
            total,
            &label,
            engine.config().max_stage_retries,
            Duration::from_secs(engine.config().stage_retry_base_secs),
            || synthesize_batch(engine, &prompt, &job.voice),
        )
        .await?;

        let audio = match retried {
            RetryResult::Value(value) => value,
            RetryResult::Interrupted(outcome) => return Ok(outcome),
        };

        let segments = split_pcm(&audio.pcm, audio.sample_rate, batch.len());
        if segments.len() < batch.len() {
            warn!(
                job_id = %job.id,
                batch_index,
                expected = batch.len(),
                got = segments.len(),
                "Splitter under-delivered, falling back to whole batch audio"
            );
        }

        for (entry_index, record) in batch.iter().enumerate() {
            // Whole-batch fallback keeps every entry audible even if
            // segmentation failed.
            let payload = segments
                .get(entry_index)
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.as_slice())
                .unwrap_or(&audio.pcm);

            db.upsert_audio_log(&AudioLogUpsert {
                id: record.id,
                name: record.name.clone(),
                region: job.region.clone(),
                generation_id: job.generation_id,
                voice: job.voice.clone(),
                audio_base64: BASE64.encode(payload),
                audio_format: AUDIO_FORMAT_PCM.to_string(),
                sample_rate: audio.sample_rate as i64,
            })
            .await?;
        }

        db.set_job_progress(
            &job.id,
            JobStage::Audio,
            current + 1,
            total,
            &format!("Saved audio logs for batch {}/{}", batch_index + 1, total),
        )
        .await?;

        info!(
            job_id = %job.id,
            batch = batch_index + 1,
            total,
            entries = batch.len(),
            "Saved audio batch"
        );

        if current + 1 < total {
            let base = Duration::from_secs(engine.config().audio_cooldown_secs);
            if let Some(outcome) = cooldown_with_control(db, &job.id, base).await? {
                return Ok(outcome);
            }
        }
    }

    Ok(StageOutcome::Completed)
}

/// Text spoken for one entry inside a combined batch.
fn spoken_entry(record: &SummaryRecord) -> String {
    format!("Field log, {}. {}", record.name, record.summary)
}

/// Partition summaries into TTS batches bounded by entry count and
/// combined character count. Id order is preserved; an entry that
/// would push the open batch over either limit starts a new one, and
/// a single oversize entry still gets a batch of its own.
fn chunk_summaries(
    summaries: &[SummaryRecord],
    max_count: usize,
    max_chars: usize,
) -> Vec<Vec<SummaryRecord>> {
    let max_count = max_count.max(1);
    let mut batches: Vec<Vec<SummaryRecord>> = Vec::new();
    let mut open: Vec<SummaryRecord> = Vec::new();
    let mut open_chars = 0usize;

    for record in summaries {
        let entry_chars = spoken_entry(record).len() + TTS_PAUSE_MARKER.len();

        let over_count = open.len() >= max_count;
        let over_chars = !open.is_empty() && open_chars + entry_chars > max_chars;
        if over_count || over_chars {
            batches.push(std::mem::take(&mut open));
            open_chars = 0;
        }

        open_chars += entry_chars;
        open.push(record.clone());
    }

    if !open.is_empty() {
        batches.push(open);
    }

    batches
}
