//! Library store tests: upsert semantics and prompt overrides.

use crate::core::prompts;
use crate::database::{AudioLogUpsert, LibraryOps, PromptKind, SummaryUpsert};
use crate::tests::common::test_db;

fn summary(id: i64, text: &str) -> SummaryUpsert {
    SummaryUpsert {
        id,
        name: format!("mon-{}", id),
        summary: text.to_string(),
        region: "Kanto".to_string(),
        generation_id: 1,
    }
}

fn audio(id: i64, payload: &str) -> AudioLogUpsert {
    AudioLogUpsert {
        id,
        name: format!("mon-{}", id),
        region: "Kanto".to_string(),
        generation_id: 1,
        voice: "Kore".to_string(),
        audio_base64: payload.to_string(),
        audio_format: "pcm_s16le".to_string(),
        sample_rate: 24_000,
    }
}

#[tokio::test]
async fn test_summary_upsert_preserves_created_at() {
    let db = test_db().await;

    db.upsert_summary(&summary(1, "first draft")).await.unwrap();
    let original = db.get_summary(1).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    db.upsert_summary(&summary(1, "second draft")).await.unwrap();
    let replaced = db.get_summary(1).await.unwrap().unwrap();

    assert_eq!(replaced.summary, "second draft");
    assert_eq!(replaced.created_at, original.created_at);
    assert!(replaced.updated_at > original.updated_at);
}

#[tokio::test]
async fn test_get_summaries_filters_and_orders() {
    let db = test_db().await;

    for id in [5, 1, 3] {
        db.upsert_summary(&summary(id, "entry")).await.unwrap();
    }

    let records = db.get_summaries(&[1, 2, 3, 5]).await.unwrap();
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3, 5]);

    assert!(db.get_summaries(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_summary() {
    let db = test_db().await;
    db.upsert_summary(&summary(1, "entry")).await.unwrap();

    assert!(db.delete_summary(1).await.unwrap());
    assert!(!db.delete_summary(1).await.unwrap());
    assert!(db.get_summary(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_audio_upsert_replaces_payload() {
    let db = test_db().await;

    db.upsert_audio_log(&audio(7, "QUJD")).await.unwrap();
    let original = db.get_audio_log(7).await.unwrap().unwrap();

    db.upsert_audio_log(&audio(7, "WFla")).await.unwrap();
    let replaced = db.get_audio_log(7).await.unwrap().unwrap();

    assert_eq!(replaced.audio_base64, "WFla");
    assert_eq!(replaced.created_at, original.created_at);

    let listed = db.list_audio_logs().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_prompt_override_roundtrip() {
    let db = test_db().await;

    // No override stored: the accessor serves the built-in default.
    let resolved = prompts::resolve_prompt(&db, PromptKind::Summary).await.unwrap();
    assert_eq!(resolved, prompts::DEFAULT_SUMMARY_PROMPT);

    db.set_prompt(PromptKind::Summary, "custom template {{name}}")
        .await
        .unwrap();
    let resolved = prompts::resolve_prompt(&db, PromptKind::Summary).await.unwrap();
    assert_eq!(resolved, "custom template {{name}}");

    // The TTS prompt is untouched by the summary override.
    let tts = prompts::resolve_prompt(&db, PromptKind::Tts).await.unwrap();
    assert_eq!(tts, prompts::DEFAULT_TTS_PROMPT);

    assert!(db.delete_prompt(PromptKind::Summary).await.unwrap());
    let resolved = prompts::resolve_prompt(&db, PromptKind::Summary).await.unwrap();
    assert_eq!(resolved, prompts::DEFAULT_SUMMARY_PROMPT);
}
