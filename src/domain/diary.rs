//! Diary records: days, notes, and the people/tag catalog.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default role assigned to people the AI discovers in notes.
pub const DEFAULT_PERSON_ROLE: &str = "Friend/Family";

/// Default project for tags the AI discovers in notes.
pub const DEFAULT_TAG_PROJECT: &str = "diary";

/// One question the AI asked and the answer the user gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// The aggregation unit: one record per calendar date, holding the
/// synthesized narrative and everything extracted from that day's notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Day {
    /// Unique identifier
    pub id: Uuid,

    /// Calendar date (unique across the store)
    pub date: NaiveDate,

    /// AI-generated narrative for the whole day
    pub summary: Option<String>,

    /// Single glyph capturing the day's feeling
    pub mood: Option<String>,

    /// Short lessons or insights pulled from the notes
    #[serde(default)]
    pub learnings: Vec<String>,

    /// People the AI found in the day's notes
    #[serde(default)]
    pub person_ids: Vec<Uuid>,

    /// Topics/places the AI found in the day's notes
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,

    /// When the narrative was last generated
    pub summarized_at: Option<DateTime<Utc>>,

    /// Reflective question/answer history (append-only)
    #[serde(default)]
    pub qa: Vec<QaPair>,
}

impl Day {
    /// Create an empty day for a date.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            summary: None,
            mood: None,
            learnings: Vec::new(),
            person_ids: Vec::new(),
            tag_ids: Vec::new(),
            summarized_at: None,
            qa: Vec::new(),
        }
    }
}

/// The summary fields written back to a Day as one atomic unit.
#[derive(Debug, Clone)]
pub struct DaySummaryUpdate {
    pub summary: String,
    pub mood: String,
    pub learnings: Vec<String>,
    pub person_ids: Vec<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub summarized_at: DateTime<Utc>,
}

/// A single voice or text capture belonging to a Day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: Uuid,

    /// The day this note belongs to
    pub day_id: Uuid,

    /// When the note was captured; used as the timestamp in the transcript
    pub created_at: DateTime<Utc>,

    /// Transcribed (or typed) text
    pub transcription: Option<String>,

    /// Whether the AI has finished transcribing this note
    pub is_transcribed: bool,

    /// MIME type of the stored audio, if this is a voice note
    pub audio_mime: Option<String>,
}

impl Note {
    /// Create a voice note awaiting transcription.
    pub fn voice(day_id: Uuid, mime: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_id,
            created_at: Utc::now(),
            transcription: None,
            is_transcribed: false,
            audio_mime: Some(mime.into()),
        }
    }

    /// Create a typed note that already carries its text.
    pub fn text(day_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_id,
            created_at: Utc::now(),
            transcription: Some(body.into()),
            is_transcribed: true,
            audio_mime: None,
        }
    }
}

/// A catalog entry for a person mentioned in the diary.
///
/// Name uniqueness (case-insensitive) is enforced by the entity resolver,
/// not by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub project_ids: Vec<String>,
}

impl Person {
    /// Create a person with the default role for AI-discovered entries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role: DEFAULT_PERSON_ROLE.to_string(),
            project_ids: Vec::new(),
        }
    }
}

/// A catalog entry for a topic or place mentioned in the diary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub project_id: String,
}

impl Tag {
    /// Create a tag in the default diary project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            project_id: DEFAULT_TAG_PROJECT.to_string(),
        }
    }
}
