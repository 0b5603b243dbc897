//! Library store operations.
//!
//! CRUD for saved summaries, audio logs, and prompt overrides. Upserts
//! replace the row in place while preserving `created_at`.

use chrono::Utc;

use super::models::{AudioLogRecord, PromptKind, PromptRecord, SummaryRecord};
use super::{Database, StoreResult};

/// Input for a summary upsert.
#[derive(Debug, Clone)]
pub struct SummaryUpsert {
    pub id: i64,
    pub name: String,
    pub summary: String,
    pub region: String,
    pub generation_id: i64,
}

/// Input for an audio log upsert.
#[derive(Debug, Clone)]
pub struct AudioLogUpsert {
    pub id: i64,
    pub name: String,
    pub region: String,
    pub generation_id: i64,
    pub voice: String,
    pub audio_base64: String,
    pub audio_format: String,
    pub sample_rate: i64,
}

/// Extension trait for summary, audio log, and prompt operations.
pub trait LibraryOps {
    fn upsert_summary(&self, input: &SummaryUpsert) -> impl std::future::Future<Output = StoreResult<()>> + Send;
    fn get_summary(&self, id: i64) -> impl std::future::Future<Output = StoreResult<Option<SummaryRecord>>> + Send;
    fn get_summaries(&self, ids: &[i64]) -> impl std::future::Future<Output = StoreResult<Vec<SummaryRecord>>> + Send;
    fn list_summaries(&self) -> impl std::future::Future<Output = StoreResult<Vec<SummaryRecord>>> + Send;
    fn delete_summary(&self, id: i64) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    fn upsert_audio_log(&self, input: &AudioLogUpsert) -> impl std::future::Future<Output = StoreResult<()>> + Send;
    fn get_audio_log(&self, id: i64) -> impl std::future::Future<Output = StoreResult<Option<AudioLogRecord>>> + Send;
    fn list_audio_logs(&self) -> impl std::future::Future<Output = StoreResult<Vec<AudioLogRecord>>> + Send;
    fn delete_audio_log(&self, id: i64) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    fn set_prompt(&self, kind: PromptKind, content: &str) -> impl std::future::Future<Output = StoreResult<()>> + Send;
    fn get_prompt(&self, kind: PromptKind) -> impl std::future::Future<Output = StoreResult<Option<PromptRecord>>> + Send;
    fn delete_prompt(&self, kind: PromptKind) -> impl std::future::Future<Output = StoreResult<bool>> + Send;
}

impl LibraryOps for Database {
    // =========================================================================
    // Summaries
    // =========================================================================

    async fn upsert_summary(&self, input: &SummaryUpsert) -> StoreResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO summaries (id, name, summary, region, generation_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                summary = excluded.summary,
                region = excluded.region,
                generation_id = excluded.generation_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(input.id)
        .bind(&input.name)
        .bind(&input.summary)
        .bind(&input.region)
        .bind(input.generation_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_summary(&self, id: i64) -> StoreResult<Option<SummaryRecord>> {
        let record = sqlx::query_as::<_, SummaryRecord>("SELECT * FROM summaries WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(record)
    }

    async fn get_summaries(&self, ids: &[i64]) -> StoreResult<Vec<SummaryRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // sqlx has no array binds for SQLite; expand placeholders.
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM summaries WHERE id IN ({}) ORDER BY id ASC",
            placeholders
        );

        let mut query = sqlx::query_as::<_, SummaryRecord>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let records = query.fetch_all(self.pool()).await?;
        Ok(records)
    }

    async fn list_summaries(&self) -> StoreResult<Vec<SummaryRecord>> {
        let records = sqlx::query_as::<_, SummaryRecord>("SELECT * FROM summaries ORDER BY id ASC")
            .fetch_all(self.pool())
            .await?;
        Ok(records)
    }

    async fn delete_summary(&self, id: i64) -> StoreResult<bool> {
        let rows = sqlx::query("DELETE FROM summaries WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    // =========================================================================
    // Audio Logs
    // =========================================================================

    async fn upsert_audio_log(&self, input: &AudioLogUpsert) -> StoreResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO audio_logs (id, name, region, generation_id, voice,
                audio_base64, audio_format, sample_rate, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                region = excluded.region,
                generation_id = excluded.generation_id,
                voice = excluded.voice,
                audio_base64 = excluded.audio_base64,
                audio_format = excluded.audio_format,
                sample_rate = excluded.sample_rate,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(input.id)
        .bind(&input.name)
        .bind(&input.region)
        .bind(input.generation_id)
        .bind(&input.voice)
        .bind(&input.audio_base64)
        .bind(&input.audio_format)
        .bind(input.sample_rate)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_audio_log(&self, id: i64) -> StoreResult<Option<AudioLogRecord>> {
        let record = sqlx::query_as::<_, AudioLogRecord>("SELECT * FROM audio_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(record)
    }

    async fn list_audio_logs(&self) -> StoreResult<Vec<AudioLogRecord>> {
        let records =
            sqlx::query_as::<_, AudioLogRecord>("SELECT * FROM audio_logs ORDER BY id ASC")
                .fetch_all(self.pool())
                .await?;
        Ok(records)
    }

    async fn delete_audio_log(&self, id: i64) -> StoreResult<bool> {
        let rows = sqlx::query("DELETE FROM audio_logs WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    async fn set_prompt(&self, kind: PromptKind, content: &str) -> StoreResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO prompts (type, content, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(type) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind)
        .bind(content)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_prompt(&self, kind: PromptKind) -> StoreResult<Option<PromptRecord>> {
        let record = sqlx::query_as::<_, PromptRecord>("SELECT * FROM prompts WHERE type = ?")
            .bind(kind)
            .fetch_optional(self.pool())
            .await?;
        Ok(record)
    }

    async fn delete_prompt(&self, kind: PromptKind) -> StoreResult<bool> {
        let rows = sqlx::query("DELETE FROM prompts WHERE type = ?")
            .bind(kind)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(rows > 0)
    }
}
