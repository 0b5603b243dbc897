//! Job endpoints: creation, status, control, and maintenance.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::database::{JobMode, JobOps, JobRecord, NewJob};

use super::{ApiError, ApiResponse, ApiResult, AppState};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub mode: String,
    pub generation_id: serde_json::Value,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub voice: String,
    pub pokemon_ids: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverStalledRequest {
    pub stalled_threshold_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverStalledResponse {
    pub recovered_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseAllResponse {
    pub paused_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllResponse {
    pub canceled_count: u64,
}

// ============================================================================
// Validation
// ============================================================================

/// Mode strings are accepted in either the wire's upper snake form
/// (`SUMMARY_ONLY`) or lower snake (`summary_only`).
fn parse_mode(raw: &str) -> Result<JobMode, ApiError> {
    JobMode::try_from(raw.to_lowercase().as_str())
        .map_err(|_| ApiError::bad_request(format!("Invalid mode: {}", raw)))
}

fn parse_generation_id(raw: &serde_json::Value) -> Result<i64, ApiError> {
    numeric_to_i64(raw).ok_or_else(|| ApiError::bad_request("generationId must be a number"))
}

/// Accept integral JSON numbers only; floats with a fractional part,
/// strings, and other types are rejected rather than silently rounded.
fn numeric_to_i64(value: &serde_json::Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            return Some(f as i64);
        }
    }
    None
}

fn parse_pokemon_ids(raw: &[serde_json::Value]) -> Result<Vec<i64>, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::bad_request("pokemonIds must not be empty"));
    }
    raw.iter()
        .map(|value| {
            numeric_to_i64(value)
                .ok_or_else(|| ApiError::bad_request("pokemonIds must contain integers"))
        })
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<CreateJobResponse> {
    let mode = parse_mode(&request.mode)?;
    let generation_id = parse_generation_id(&request.generation_id)?;
    let ids = parse_pokemon_ids(&request.pokemon_ids)?;

    let input = NewJob::new(mode, generation_id, request.region, request.voice, &ids)?;
    let job = state.db.create_job(&input).await?;

    Ok(ApiResponse::ok(CreateJobResponse { id: job.id }))
}

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Vec<JobRecord>> {
    let jobs = state.db.list_jobs().await?;
    Ok(ApiResponse::ok(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<JobRecord> {
    let job = state
        .db
        .get_job(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", id)))?;
    Ok(ApiResponse::ok(job))
}

pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<JobRecord> {
    let job = state.db.pause_job(&id).await?;
    Ok(ApiResponse::ok(job))
}

pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<JobRecord> {
    let job = state.db.resume_job(&id).await?;
    Ok(ApiResponse::ok(job))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<JobRecord> {
    let job = state.db.cancel_job(&id).await?;
    Ok(ApiResponse::ok(job))
}

pub async fn recover_stalled(
    State(state): State<AppState>,
    body: Option<Json<RecoverStalledRequest>>,
) -> ApiResult<RecoverStalledResponse> {
    let threshold = body
        .and_then(|Json(request)| request.stalled_threshold_ms)
        .unwrap_or(state.stalled_threshold_ms);

    if threshold <= 0 {
        return Err(ApiError::bad_request("stalledThresholdMs must be positive"));
    }

    let recovered_count = state.db.recover_stalled_jobs(threshold).await?;
    Ok(ApiResponse::ok(RecoverStalledResponse { recovered_count }))
}

pub async fn pause_all(State(state): State<AppState>) -> ApiResult<PauseAllResponse> {
    let paused_count = state.db.pause_all_jobs().await?;
    Ok(ApiResponse::ok(PauseAllResponse { paused_count }))
}

pub async fn cancel_all(State(state): State<AppState>) -> ApiResult<CancelAllResponse> {
    let canceled_count = state.db.cancel_all_jobs().await?;
    Ok(ApiResponse::ok(CancelAllResponse { canceled_count }))
}
