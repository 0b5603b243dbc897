//! Job and library record models.
//!
//! Database records for jobs, saved field log summaries, synthesized
//! audio logs, and prompt overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::StoreError;

// ============================================================================
// Job Enums
// ============================================================================

/// What a job produces: summaries, audio, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum JobMode {
    Full,
    SummaryOnly,
    AudioOnly,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Full => "full",
            JobMode::SummaryOnly => "summary_only",
            JobMode::AudioOnly => "audio_only",
        }
    }

    /// The stage a freshly created job starts in.
    pub fn initial_stage(&self) -> JobStage {
        match self {
            JobMode::AudioOnly => JobStage::Audio,
            _ => JobStage::Summary,
        }
    }
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for JobMode {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "full" => Ok(JobMode::Full),
            "summary_only" => Ok(JobMode::SummaryOnly),
            "audio_only" => Ok(JobMode::AudioOnly),
            _ => Err(format!("Unknown job mode: {}", s)),
        }
    }
}

/// Pipeline stage a job is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum JobStage {
    Summary,
    Audio,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Summary => "summary",
            JobStage::Audio => "audio",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for JobStage {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "summary" => Ok(JobStage::Summary),
            "audio" => Ok(JobStage::Audio),
            _ => Err(format!("Unknown job stage: {}", s)),
        }
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Terminal statuses accept no further writes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// Failure is reachable from any non-terminal status; everything
    /// else follows queued -> running -> {paused, canceled, completed}
    /// with paused -> queued on resume.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        match (self, to) {
            (_, Failed) => !self.is_terminal(),
            (Queued, Running) => true,
            (Queued, Paused) => true,
            (Queued, Canceled) => true,
            (Running, Paused) => true,
            (Running, Canceled) => true,
            (Running, Completed) => true,
            (Running, Queued) => true,
            (Paused, Queued) => true,
            (Paused, Canceled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

// ============================================================================
// Job Record
// ============================================================================

/// Durable job record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub mode: JobMode,
    pub generation_id: i64,
    pub region: String,
    pub voice: String,
    pub pokemon_ids: Json<Vec<i64>>,
    /// Id count during the summary stage, batch count during audio.
    pub total: i64,
    /// Cursor: next id index (summary) or next batch index (audio).
    pub current: i64,
    pub stage: JobStage,
    pub status: JobStatus,
    pub message: String,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pokemon_ids(&self) -> &[i64] {
        &self.pokemon_ids.0
    }
}

/// Validated input for job creation.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub mode: JobMode,
    pub generation_id: i64,
    pub region: String,
    pub voice: String,
    pub pokemon_ids: Vec<i64>,
}

impl NewJob {
    /// Validate and normalize a raw request: ids must be positive, are
    /// deduplicated, and persisted in ascending order; the list must
    /// not end up empty.
    pub fn new(
        mode: JobMode,
        generation_id: i64,
        region: impl Into<String>,
        voice: impl Into<String>,
        raw_ids: &[i64],
    ) -> Result<Self, StoreError> {
        let mut ids: Vec<i64> = raw_ids.iter().copied().filter(|id| *id > 0).collect();
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            return Err(StoreError::InvalidInput(
                "pokemonIds must contain at least one positive id".to_string(),
            ));
        }

        Ok(Self {
            mode,
            generation_id,
            region: region.into(),
            voice: voice.into(),
            pokemon_ids: ids,
        })
    }
}

// ============================================================================
// Library Records
// ============================================================================

/// Saved field log summary, keyed by Pokedex id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub id: i64,
    pub name: String,
    pub summary: String,
    pub region: String,
    pub generation_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Synthesized audio log, keyed by Pokedex id.
///
/// The payload is base64 of raw 16-bit signed little-endian mono PCM;
/// `sample_rate` is the PCM rate in Hz.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AudioLogRecord {
    pub id: i64,
    pub name: String,
    pub region: String,
    pub generation_id: i64,
    pub voice: String,
    pub audio_base64: String,
    pub audio_format: String,
    pub sample_rate: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which prompt template an override replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PromptKind {
    Summary,
    Tts,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Summary => "summary",
            PromptKind::Tts => "tts",
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PromptKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "summary" => Ok(PromptKind::Summary),
            "tts" => Ok(PromptKind::Tts),
            _ => Err(format!("Unknown prompt type: {}", s)),
        }
    }
}

/// Stored prompt override.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    #[sqlx(rename = "type")]
    pub kind: PromptKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
