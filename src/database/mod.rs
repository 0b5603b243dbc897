//! SQLite persistence layer.
//!
//! The [`Database`] owns the connection pool; table-family operations
//! hang off it through extension traits ([`JobOps`], [`LibraryOps`]).
//! Jobs are the only contended table: claims and status transitions go
//! through single transactions so concurrent schedulers cannot double-
//! claim, while summary/audio/prompt access is plain CRUD with upserts.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

pub mod jobs;
pub mod library;
pub mod migrations;
pub mod models;

pub use jobs::JobOps;
pub use library::{AudioLogUpsert, LibraryOps, SummaryUpsert};
pub use models::{
    AudioLogRecord, JobMode, JobRecord, JobStage, JobStatus, NewJob, PromptKind, PromptRecord,
    SummaryRecord,
};

/// Errors surfaced by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid job input: {0}")]
    InvalidInput(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if needed) the database at `path`, running any
    /// pending migrations.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Sqlx(sqlx::Error::Io(e))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(StoreError::Sqlx)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database with the schema applied. Used by tests.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
