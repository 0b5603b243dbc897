//! Library endpoints: saved summaries, audio logs, prompt overrides,
//! and the health probe.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::prompts;
use crate::database::{AudioLogRecord, LibraryOps, PromptKind, SummaryRecord};

use super::{ApiError, ApiResponse, ApiResult, AppState};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Audio log without its payload; the list endpoint stays light even
/// with minutes of PCM in the table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLogMeta {
    pub id: i64,
    pub name: String,
    pub region: String,
    pub generation_id: i64,
    pub voice: String,
    pub audio_format: String,
    pub sample_rate: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AudioLogRecord> for AudioLogMeta {
    fn from(record: AudioLogRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            region: record.region,
            generation_id: record.generation_id,
            voice: record.voice,
            audio_format: record.audio_format,
            sample_rate: record.sample_rate,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    #[serde(rename = "type")]
    pub kind: PromptKind,
    pub content: String,
    /// True when no stored override exists and the built-in template
    /// is being served.
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPromptRequest {
    pub content: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: crate::VERSION,
    })
}

pub async fn list_summaries(State(state): State<AppState>) -> ApiResult<Vec<SummaryRecord>> {
    let records = state.db.list_summaries().await?;
    Ok(ApiResponse::ok(records))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<SummaryRecord> {
    let record = state
        .db
        .get_summary(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Summary not found: #{}", id)))?;
    Ok(ApiResponse::ok(record))
}

pub async fn delete_summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<bool> {
    let deleted = state.db.delete_summary(id).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("Summary not found: #{}", id)));
    }
    Ok(ApiResponse::ok(true))
}

pub async fn list_audio_logs(State(state): State<AppState>) -> ApiResult<Vec<AudioLogMeta>> {
    let records = state.db.list_audio_logs().await?;
    Ok(ApiResponse::ok(records.into_iter().map(Into::into).collect()))
}

pub async fn get_audio_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<AudioLogRecord> {
    let record = state
        .db
        .get_audio_log(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Audio log not found: #{}", id)))?;
    Ok(ApiResponse::ok(record))
}

pub async fn delete_audio_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<bool> {
    let deleted = state.db.delete_audio_log(id).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("Audio log not found: #{}", id)));
    }
    Ok(ApiResponse::ok(true))
}

fn parse_prompt_kind(raw: &str) -> Result<PromptKind, ApiError> {
    PromptKind::try_from(raw)
        .map_err(|_| ApiError::bad_request(format!("Invalid prompt type: {}", raw)))
}

pub async fn get_prompt(
    State(state): State<AppState>,
    Path(raw_kind): Path<String>,
) -> ApiResult<PromptResponse> {
    let kind = parse_prompt_kind(&raw_kind)?;

    let stored = state.db.get_prompt(kind).await?;
    let response = match stored {
        Some(record) => PromptResponse {
            kind,
            content: record.content,
            is_default: false,
        },
        None => PromptResponse {
            kind,
            content: prompts::default_prompt(kind).to_string(),
            is_default: true,
        },
    };
    Ok(ApiResponse::ok(response))
}

pub async fn set_prompt(
    State(state): State<AppState>,
    Path(raw_kind): Path<String>,
    Json(request): Json<SetPromptRequest>,
) -> ApiResult<PromptResponse> {
    let kind = parse_prompt_kind(&raw_kind)?;

    if request.content.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt content must not be empty"));
    }

    state.db.set_prompt(kind, &request.content).await?;
    Ok(ApiResponse::ok(PromptResponse {
        kind,
        content: request.content,
        is_default: false,
    }))
}
