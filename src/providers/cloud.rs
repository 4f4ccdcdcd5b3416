//! Hosted-model backend over HTTP.
//!
//! Sends schema-constrained generation requests, so replies are
//! structurally guaranteed and skip the free-text JSON recovery path.
//! Audio travels inline as base64 with its MIME type.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{ModelTier, Settings};
use crate::domain::QaPair;

use super::{report, DaySummary, InferenceProvider, Progress, ProviderError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const TRANSCRIBE_PROMPT: &str = "You are an expert at transcribing speech. Listen to this \
voice note and write down exactly what is said. Your output must be only the transcribed \
text. Do not add commentary.";

/// Cloud inference backend.
pub struct CloudProvider {
    /// API credential; calls fail with CredentialMissing when absent
    api_key: Option<String>,

    /// Model name derived from the configured tier
    model: &'static str,

    base_url: String,
    client: reqwest::Client,
}

/// Response envelope from the generation API
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Wire shape of a transcription reply
#[derive(Debug, Deserialize)]
struct TranscriptionReply {
    #[serde(default)]
    text: String,
}

impl CloudProvider {
    /// Create a provider from settings; the credential and tier are
    /// captured here, never re-read later.
    pub fn new(settings: &Settings) -> Self {
        let model = match settings.model_tier {
            ModelTier::Fast => "gemini-2.5-flash",
            ModelTier::Accurate => "gemini-2.5-pro",
        };

        Self {
            api_key: settings.api_key.clone(),
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different API host (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run one schema-constrained generation call and return the reply text.
    async fn generate(&self, parts: Value, schema: Value) -> Result<String, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::CredentialMissing)?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            },
        });

        debug!(model = self.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::ModelCrash(format!(
                "API returned {}: {}",
                status,
                detail.trim()
            )));
        }

        let parsed: GenerateResponse = response.json().await?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::ModelCrash("empty response from model".to_string()))
    }

    /// Parse a schema-constrained reply; a mismatch here is a backend
    /// fault, not a recoverable free-text situation.
    fn parse_strict<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
        serde_json::from_str(raw).map_err(|e| {
            ProviderError::ModelCrash(format!("schema-constrained reply did not parse: {}", e))
        })
    }
}

#[async_trait]
impl InferenceProvider for CloudProvider {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        mime: &str,
        progress: Progress<'_>,
    ) -> Result<String, ProviderError> {
        if audio.is_empty() {
            return Err(ProviderError::MediaMissing);
        }

        report(progress, 10, "Preparing audio");
        let encoded = BASE64.encode(audio);

        report(progress, 40, "Transcribing note");
        let parts = json!([
            { "text": TRANSCRIBE_PROMPT },
            { "inlineData": { "mimeType": mime, "data": encoded } },
        ]);

        let raw = self.generate(parts, transcribe_schema()).await?;
        let reply: TranscriptionReply = Self::parse_strict(&raw)?;

        report(progress, 90, "Saving text");
        Ok(reply.text)
    }

    async fn summarize(
        &self,
        transcript: &str,
        qa: &[QaPair],
        prompt_template: &str,
        progress: Progress<'_>,
    ) -> Result<DaySummary, ProviderError> {
        report(progress, 20, "Reading the day's notes");

        let prompt = format!(
            "{}\n\n{}",
            prompt_template,
            super::summary_user_prompt(transcript, qa)
        );

        report(progress, 50, "Writing the diary entry");
        let raw = self
            .generate(json!([{ "text": prompt }]), summarize_schema())
            .await?;

        report(progress, 80, "Saving tags and people");
        Self::parse_strict(&raw)
    }

    async fn generate_questions(
        &self,
        transcript: &str,
        prompt_template: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let prompt = format!(
            "{}\n\nRead my short diary notes from today:\n\n{}",
            prompt_template, transcript
        );

        let raw = self
            .generate(json!([{ "text": prompt }]), questions_schema())
            .await?;

        let reply: super::QuestionsResponse = Self::parse_strict(&raw)?;
        Ok(reply.questions)
    }
}

// ----------------------------------------------------------------------
// Response schemas sent with each request
// ----------------------------------------------------------------------

fn transcribe_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "text": {
                "type": "STRING",
                "description": "The exact transcription of what was said."
            }
        }
    })
}

fn summarize_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "STRING",
                "description": "A warm, empathetic and reflective diary summary."
            },
            "mood": {
                "type": "STRING",
                "description": "A single emoji that best captures the day's feeling."
            },
            "learnings": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "1-3 short lessons or insights from the day."
            },
            "peopleMentioned": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "First names of people mentioned in the notes."
            },
            "tagsMentioned": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "1-4 short general topics or places mentioned."
            }
        }
    })
}

fn questions_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "questions": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "2-3 open, reflective questions about the day's notes."
            }
        }
    })
}
