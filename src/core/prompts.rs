//! Prompt templates.
//!
//! Built-in defaults for the summary and TTS prompts, plus the single
//! accessor that prefers a stored override. The engine treats template
//! content as opaque; placeholders are only interpreted here.

use crate::core::catalog::CatalogDetails;
use crate::database::{Database, LibraryOps, PromptKind, StoreResult};

/// Marker inserted between entries in a combined TTS prompt. The voice
/// model renders it as a long silent gap, which is what the splitter
/// later keys on.
pub const TTS_PAUSE_MARKER: &str = "\n\n... [pause for three seconds] ...\n\n";

pub const DEFAULT_SUMMARY_PROMPT: &str = r#"You are a seasoned field researcher dictating an entry for your expedition log in the {{region}} region.

Subject: {{name}} ({{genus}})
Types: {{types}}
Habitat: {{habitat}}
Reference notes: {{flavor_text}}

Write a vivid two-to-three sentence field log entry about this Pokemon as if you observed it in the wild today. Describe behavior and atmosphere, not game mechanics. Respond with strict JSON in exactly this shape and nothing else:
{"summary": "<your field log entry>"}"#;

pub const DEFAULT_TTS_PROMPT: &str = r#"Read the following expedition field log entries aloud in a calm, documentary narration style. Pause for a long moment wherever the text indicates a pause.

{{entries}}"#;

/// Fetch the active template for `kind`: the stored override when one
/// exists, the built-in default otherwise.
pub async fn resolve_prompt(db: &Database, kind: PromptKind) -> StoreResult<String> {
    if let Some(record) = db.get_prompt(kind).await? {
        return Ok(record.content);
    }
    Ok(default_prompt(kind).to_string())
}

pub fn default_prompt(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Summary => DEFAULT_SUMMARY_PROMPT,
        PromptKind::Tts => DEFAULT_TTS_PROMPT,
    }
}

/// Render the summary template for one catalog entry.
pub fn render_summary_prompt(template: &str, details: &CatalogDetails, region: &str) -> String {
    template
        .replace("{{region}}", region)
        .replace("{{name}}", &details.name)
        .replace("{{genus}}", &details.genus)
        .replace("{{types}}", &details.types.join(", "))
        .replace(
            "{{habitat}}",
            details.habitat.as_deref().unwrap_or("unknown"),
        )
        .replace("{{flavor_text}}", &details.flavor_text)
}

/// Render the TTS template around the combined entry text.
pub fn render_tts_prompt(template: &str, entries: &str) -> String {
    template.replace("{{entries}}", entries)
}
