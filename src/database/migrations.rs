//! Database Migrations
//!
//! Handles schema creation and versioned migrations.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{info, warn};

/// Current database schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version = get_current_version(pool).await?;

    if current_version < SCHEMA_VERSION {
        info!(
            "Running database migrations from v{} to v{}",
            current_version, SCHEMA_VERSION
        );

        for version in (current_version + 1)..=SCHEMA_VERSION {
            run_migration(pool, version).await?;
        }

        info!("Database migrations completed successfully");
    }

    Ok(())
}

/// Get the current schema version
async fn get_current_version(pool: &SqlitePool) -> Result<i32, sqlx::Error> {
    let result = sqlx::query("SELECT MAX(version) as version FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(result
        .and_then(|row| row.try_get::<i32, _>("version").ok())
        .unwrap_or(0))
}

/// Run a specific migration version
async fn run_migration(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    let (name, sql) = match version {
        1 => ("jobs_and_library", MIGRATION_V1),
        2 => ("prompt_overrides", MIGRATION_V2),
        _ => {
            warn!("Unknown migration version: {}", version);
            return Ok(());
        }
    };

    info!("Applying migration v{}: {}", version, name);

    for statement in sql.split(";").filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement.trim()).execute(pool).await?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(version)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Migration v1: jobs, summaries, and audio logs
const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL,
    generation_id INTEGER NOT NULL,
    region TEXT NOT NULL,
    voice TEXT NOT NULL,
    pokemon_ids TEXT NOT NULL,
    total INTEGER NOT NULL,
    "current" INTEGER NOT NULL DEFAULT 0,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    cooldown_until TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at);

CREATE TABLE IF NOT EXISTS summaries (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    summary TEXT NOT NULL,
    region TEXT NOT NULL,
    generation_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_summaries_generation ON summaries(generation_id);

CREATE TABLE IF NOT EXISTS audio_logs (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    region TEXT NOT NULL,
    generation_id INTEGER NOT NULL,
    voice TEXT NOT NULL,
    audio_base64 TEXT NOT NULL,
    audio_format TEXT NOT NULL,
    sample_rate INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audio_logs_generation ON audio_logs(generation_id)
"#;

/// Migration v2: prompt overrides
const MIGRATION_V2: &str = r#"
CREATE TABLE IF NOT EXISTS prompts (
    type TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;
