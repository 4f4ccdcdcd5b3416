//! Inference backends for transcription, summarization and questions.
//!
//! Three interchangeable providers sit behind one trait:
//! - `cloud`: hosted model over HTTP, schema-constrained responses
//! - `local`: llama.cpp-style server bound to a local model file
//! - `device`: ephemeral sessions against a platform helper
//!
//! The backend is chosen once at construction from explicit settings.
//! Free-text backends route their output through a shared JSON recovery
//! path; the schema-constrained cloud backend skips it.

pub mod cloud;
pub mod device;
pub mod local;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Settings, SummaryBackend, TranscriptionBackend};
use crate::domain::QaPair;

pub use cloud::CloudProvider;
pub use device::OnDeviceProvider;
pub use local::{LocalConfig, LocalProvider};

/// Errors a backend call can fail with
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key missing; add one in settings")]
    CredentialMissing,

    #[error("No audio data for this note")]
    MediaMissing,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Could not parse model output as the expected structure: {0}")]
    Malformed(String),

    #[error("Backend failure: {0}")]
    ModelCrash(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::ModelCrash(e.to_string())
    }
}

/// Observational progress callback: `(percent 0-100, message)`.
///
/// Invoked zero or more times; correctness never depends on it being seen.
pub type Progress<'a> = Option<&'a (dyn Fn(u8, &str) + Send + Sync)>;

/// Invoke the progress callback if the caller supplied one.
pub(crate) fn report(progress: Progress<'_>, percent: u8, message: &str) {
    if let Some(cb) = progress {
        cb(percent, message);
    }
}

/// Structured result of a day-level summarization call.
///
/// Field names are the wire contract shared by all backends (the cloud
/// response schema and the free-text prompts both use them).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaySummary {
    /// The narrative diary entry
    pub summary: String,

    /// A single glyph capturing the day's feeling
    pub mood: String,

    /// 0-3 short lessons from the day
    pub learnings: Vec<String>,

    /// First names of people mentioned in the notes
    pub people_mentioned: Vec<String>,

    /// 1-4 short topics or places mentioned in the notes
    pub tags_mentioned: Vec<String>,
}

/// Wire shape for the questions call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct QuestionsResponse {
    pub questions: Vec<String>,
}

/// An inference backend implementing the three diary operations.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Transcribe a voice recording to plain text.
    async fn transcribe(
        &self,
        audio: &[u8],
        mime: &str,
        progress: Progress<'_>,
    ) -> Result<String, ProviderError>;

    /// Synthesize a day narrative from the assembled transcript and any
    /// answered reflective questions.
    async fn summarize(
        &self,
        transcript: &str,
        qa: &[QaPair],
        prompt_template: &str,
        progress: Progress<'_>,
    ) -> Result<DaySummary, ProviderError>;

    /// Generate 2-4 open reflective questions about the day. A backend
    /// returning zero items yields an empty list, not an error.
    async fn generate_questions(
        &self,
        transcript: &str,
        prompt_template: &str,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Build the transcription backend selected in settings.
pub fn transcription_provider(settings: &Settings) -> Box<dyn InferenceProvider> {
    match settings.transcription_backend {
        TranscriptionBackend::Cloud => Box::new(CloudProvider::new(settings)),
        TranscriptionBackend::Local => {
            Box::new(LocalProvider::new(LocalConfig::from_settings(settings)))
        }
    }
}

/// Build the summarization/questions backend selected in settings.
pub fn summary_provider(settings: &Settings) -> Box<dyn InferenceProvider> {
    match settings.summary_backend {
        SummaryBackend::Cloud => Box::new(CloudProvider::new(settings)),
        SummaryBackend::Local => {
            Box::new(LocalProvider::new(LocalConfig::from_settings(settings)))
        }
        SummaryBackend::OnDevice => Box::new(OnDeviceProvider::new()),
    }
}

/// Assemble the user portion of the summarize prompt from the transcript
/// and the answered-question history.
pub(crate) fn summary_user_prompt(transcript: &str, qa: &[QaPair]) -> String {
    let mut text = format!("Here are my notes from today:\n\n{}", transcript);

    if !qa.is_empty() {
        text.push_str("\n\nI have also answered these reflective questions about the day:\n");
        for pair in qa {
            text.push_str(&format!(
                "- Question: {}\n  My answer: {}\n",
                pair.question, pair.answer
            ));
        }
    }

    text
}

/// Output instructions appended by free-text backends, which have no
/// response schema to lean on.
pub(crate) const JSON_SUMMARY_INSTRUCTION: &str = "Reply with only a JSON object with the \
fields \"summary\" (string), \"mood\" (a single emoji), \"learnings\" (array of 0-3 short \
strings), \"peopleMentioned\" (array of first names) and \"tagsMentioned\" (array of 1-4 \
short topics). No other text.";

pub(crate) const JSON_QUESTIONS_INSTRUCTION: &str = "Reply with only a JSON array of 2-3 \
question strings. No other text.";

// ----------------------------------------------------------------------
// Free-text JSON recovery
// ----------------------------------------------------------------------

/// Strip surrounding markdown code fences a chatty model may emit.
fn strip_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Locate the first well-formed JSON object or array inside free text.
///
/// Scans for balanced braces/brackets, skipping over string literals and
/// escapes, so prose around (or inside) the fragment does not confuse it.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..=i]);
            }
        }
    }

    None
}

/// Parse a free-text backend reply into a structured value: direct parse
/// first, then fence stripping, then embedded-fragment extraction. Failure
/// is a typed `Malformed` error, never a panic.
pub(crate) fn parse_loose<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    if let Ok(value) = serde_json::from_str(raw.trim()) {
        return Ok(value);
    }

    let cleaned = strip_fences(raw);
    if let Ok(value) = serde_json::from_str(cleaned) {
        return Ok(value);
    }

    if let Some(fragment) = extract_json(cleaned) {
        if let Ok(value) = serde_json::from_str(fragment) {
            return Ok(value);
        }
    }

    let preview: String = raw.chars().take(120).collect();
    Err(ProviderError::Malformed(preview))
}

/// Parse a questions reply: either `{"questions": [...]}` or a bare array.
pub(crate) fn parse_questions(raw: &str) -> Result<Vec<String>, ProviderError> {
    if let Ok(wrapped) = parse_loose::<QuestionsResponse>(raw) {
        if !wrapped.questions.is_empty() {
            return Ok(wrapped.questions);
        }
    }

    match parse_loose::<Vec<String>>(raw) {
        Ok(list) => Ok(list),
        // A backend that answered with an empty object still counts as
        // "no questions", not a failure.
        Err(_) if parse_loose::<serde_json::Value>(raw).is_ok() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_prose() {
        let raw = r#"Sure! {"summary": "ok", "mood": "🙂", "learnings": [], "peopleMentioned": [], "tagsMentioned": []} Hope that helps!"#;

        let summary: DaySummary = parse_loose(raw).unwrap();
        assert_eq!(summary.summary, "ok");
        assert_eq!(summary.mood, "🙂");
        assert!(summary.people_mentioned.is_empty());
    }

    #[test]
    fn test_extract_json_ignores_braces_inside_strings() {
        let raw = r#"note: {"summary": "used {braces} today", "mood": "🙂"} end"#;

        let summary: DaySummary = parse_loose(raw).unwrap();
        assert_eq!(summary.summary, "used {braces} today");
    }

    #[test]
    fn test_parse_loose_strips_code_fences() {
        let raw = "```json\n{\"summary\": \"fenced\", \"mood\": \"😌\"}\n```";

        let summary: DaySummary = parse_loose(raw).unwrap();
        assert_eq!(summary.summary, "fenced");
    }

    #[test]
    fn test_parse_loose_rejects_garbage() {
        let result: Result<DaySummary, _> = parse_loose("I could not think of anything.");
        assert!(matches!(result, Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn test_parse_questions_wrapped_object() {
        let raw = r#"{"questions": ["How did that feel?", "What surprised you?"]}"#;
        let questions = parse_questions(raw).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_parse_questions_bare_array_in_prose() {
        let raw = "Of course! [\"How did that feel?\", \"What did you learn?\", \"Who helped you?\"]";
        let questions = parse_questions(raw).unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], "How did that feel?");
    }

    #[test]
    fn test_parse_questions_zero_items_is_not_an_error() {
        let questions = parse_questions("{\"questions\": []}").unwrap();
        assert!(questions.is_empty());
    }

    #[test]
    fn test_summary_user_prompt_includes_qa_history() {
        let qa = vec![QaPair {
            question: "How was the swim?".to_string(),
            answer: "Cold but great.".to_string(),
        }];

        let prompt = summary_user_prompt("[08:00] went swimming", &qa);
        assert!(prompt.contains("[08:00] went swimming"));
        assert!(prompt.contains("How was the swim?"));
        assert!(prompt.contains("Cold but great."));

        let bare = summary_user_prompt("[08:00] went swimming", &[]);
        assert!(!bare.contains("reflective questions"));
    }

    #[test]
    fn test_day_summary_wire_names() {
        let json = r#"{
            "summary": "s", "mood": "🙂", "learnings": ["a"],
            "peopleMentioned": ["Alicia"], "tagsMentioned": ["Pool"]
        }"#;

        let summary: DaySummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.people_mentioned, vec!["Alicia"]);
        assert_eq!(summary.tags_mentioned, vec!["Pool"]);
    }
}
