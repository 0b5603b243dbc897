//! HTTP control surface.
//!
//! Thin axum layer over the store: job creation and control, the
//! maintenance operations, and library CRUD. Every response uses the
//! `{success, data, error}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::database::{Database, StoreError};

pub mod jobs;
pub mod library;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Default threshold for stalled-job recovery, in ms.
    pub stalled_threshold_ms: i64,
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Handler error carrying an HTTP status and an envelope body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::JobNotFound(_) | StoreError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::IllegalTransition { .. } => StatusCode::CONFLICT,
            StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StoreError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(library::health))
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/maintenance/recover-stalled", post(jobs::recover_stalled))
        .route("/jobs/maintenance/pause-all", post(jobs::pause_all))
        .route("/jobs/maintenance/cancel-all", post(jobs::cancel_all))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/pause", post(jobs::pause_job))
        .route("/jobs/:id/resume", post(jobs::resume_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/summaries", get(library::list_summaries))
        .route(
            "/summaries/:id",
            get(library::get_summary).delete(library::delete_summary),
        )
        .route("/audio-logs", get(library::list_audio_logs))
        .route(
            "/audio-logs/:id",
            get(library::get_audio_log).delete(library::delete_audio_log),
        )
        .route(
            "/prompts/:type",
            get(library::get_prompt).put(library::set_prompt),
        )
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the process exits.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Control API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
