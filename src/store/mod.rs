//! JSON-file persistence for diary records.
//!
//! One JSON document per collection (days, notes, people, tags) under a
//! root directory, plus raw audio blobs beside them. Every operation loads
//! the collection, mutates it, and writes it back; with a single logical
//! actor per record family this is all the durability the engine needs.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::domain::{Day, DaySummaryUpdate, Note, Person, QaPair, Tag};

/// Errors that can occur in the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// File-backed store for all diary records.
#[derive(Debug, Clone)]
pub struct DiaryStore {
    root: PathBuf,
}

impl DiaryStore {
    /// Open a store rooted at a directory (created on first write).
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    fn audio_path(&self, note_id: Uuid) -> PathBuf {
        self.root.join("audio").join(format!("{}.bin", note_id))
    }

    /// Load a collection, treating a missing file as empty.
    async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.collection_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write a collection back, creating the root directory if needed.
    async fn save<T: Serialize>(&self, name: &str, items: &[T]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await?;

        let content = serde_json::to_string_pretty(items)?;
        fs::write(self.collection_path(name), content).await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Days
    // ------------------------------------------------------------------

    /// Get the day for a date, if one exists.
    pub async fn day_by_date(&self, date: NaiveDate) -> Result<Option<Day>, StoreError> {
        let days: Vec<Day> = self.load("days").await?;
        Ok(days.into_iter().find(|d| d.date == date))
    }

    /// Get a day by id.
    pub async fn day(&self, id: Uuid) -> Result<Option<Day>, StoreError> {
        let days: Vec<Day> = self.load("days").await?;
        Ok(days.into_iter().find(|d| d.id == id))
    }

    /// Get the day for a date, creating an empty one if absent. Dates are
    /// unique: repeated calls return the same record.
    pub async fn get_or_create_day(&self, date: NaiveDate) -> Result<Day, StoreError> {
        let mut days: Vec<Day> = self.load("days").await?;

        if let Some(existing) = days.iter().find(|d| d.date == date) {
            return Ok(existing.clone());
        }

        let day = Day::new(date);
        days.push(day.clone());
        self.save("days", &days).await?;

        Ok(day)
    }

    /// Overwrite a day's summary fields as one atomic unit.
    pub async fn apply_summary(
        &self,
        day_id: Uuid,
        update: DaySummaryUpdate,
    ) -> Result<(), StoreError> {
        let mut days: Vec<Day> = self.load("days").await?;

        let day = days
            .iter_mut()
            .find(|d| d.id == day_id)
            .ok_or_else(|| StoreError::NotFound(format!("day {}", day_id)))?;

        day.summary = Some(update.summary);
        day.mood = Some(update.mood);
        day.learnings = update.learnings;
        day.person_ids = update.person_ids;
        day.tag_ids = update.tag_ids;
        day.summarized_at = Some(update.summarized_at);

        self.save("days", &days).await
    }

    /// Append answered questions to a day's Q&A history (append-only).
    pub async fn append_qa(&self, day_id: Uuid, pairs: &[QaPair]) -> Result<(), StoreError> {
        let mut days: Vec<Day> = self.load("days").await?;

        let day = days
            .iter_mut()
            .find(|d| d.id == day_id)
            .ok_or_else(|| StoreError::NotFound(format!("day {}", day_id)))?;

        day.qa.extend(pairs.iter().cloned());

        self.save("days", &days).await
    }

    /// Delete a day, its notes, and their audio in one cascade.
    pub async fn delete_day(&self, day_id: Uuid) -> Result<(), StoreError> {
        let mut days: Vec<Day> = self.load("days").await?;
        days.retain(|d| d.id != day_id);
        self.save("days", &days).await?;

        let mut notes: Vec<Note> = self.load("notes").await?;
        let doomed: Vec<Uuid> = notes
            .iter()
            .filter(|n| n.day_id == day_id)
            .map(|n| n.id)
            .collect();
        notes.retain(|n| n.day_id != day_id);
        self.save("notes", &notes).await?;

        for note_id in doomed {
            let path = self.audio_path(note_id);
            if path.exists() {
                fs::remove_file(path).await?;
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Persist a new note.
    pub async fn add_note(&self, note: &Note) -> Result<(), StoreError> {
        let mut notes: Vec<Note> = self.load("notes").await?;
        notes.push(note.clone());
        self.save("notes", &notes).await
    }

    /// Get a note by id.
    pub async fn note(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        let notes: Vec<Note> = self.load("notes").await?;
        Ok(notes.into_iter().find(|n| n.id == id))
    }

    /// All notes of a day, ordered by creation time.
    pub async fn notes_for_day(&self, day_id: Uuid) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self.load("notes").await?;
        notes.retain(|n| n.day_id == day_id);
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(notes)
    }

    /// Write a finished transcription to a note.
    pub async fn set_transcription(&self, note_id: Uuid, text: &str) -> Result<(), StoreError> {
        let mut notes: Vec<Note> = self.load("notes").await?;

        let note = notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| StoreError::NotFound(format!("note {}", note_id)))?;

        note.transcription = Some(text.to_string());
        note.is_transcribed = true;

        self.save("notes", &notes).await
    }

    /// Delete a note and its audio.
    pub async fn delete_note(&self, note_id: Uuid) -> Result<(), StoreError> {
        let mut notes: Vec<Note> = self.load("notes").await?;
        notes.retain(|n| n.id != note_id);
        self.save("notes", &notes).await?;

        let path = self.audio_path(note_id);
        if path.exists() {
            fs::remove_file(path).await?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Audio blobs
    // ------------------------------------------------------------------

    /// Store the raw audio of a voice note.
    pub async fn put_audio(&self, note_id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.audio_path(note_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, bytes).await?;
        Ok(())
    }

    /// Load the raw audio of a voice note, if present.
    pub async fn audio(&self, note_id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.audio_path(note_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path).await?))
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// All people in the catalog.
    pub async fn people(&self) -> Result<Vec<Person>, StoreError> {
        self.load("people").await
    }

    /// Add a person to the catalog.
    pub async fn add_person(&self, person: &Person) -> Result<(), StoreError> {
        let mut people: Vec<Person> = self.load("people").await?;
        people.push(person.clone());
        self.save("people", &people).await
    }

    /// All tags in the catalog.
    pub async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.load("tags").await
    }

    /// Add a tag to the catalog.
    pub async fn add_tag(&self, tag: &Tag) -> Result<(), StoreError> {
        let mut tags: Vec<Tag> = self.load("tags").await?;
        tags.push(tag.clone());
        self.save("tags", &tags).await
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn test_store() -> (DiaryStore, TempDir) {
        let temp = TempDir::new().unwrap();
        (DiaryStore::open(temp.path().join("store")), temp)
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_day_is_unique_per_date() {
        let (store, _temp) = test_store();

        let a = store.get_or_create_day(date("2026-08-01")).await.unwrap();
        let b = store.get_or_create_day(date("2026-08-01")).await.unwrap();
        let c = store.get_or_create_day(date("2026-08-02")).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_note_round_trip_and_transcription() {
        let (store, _temp) = test_store();
        let day = store.get_or_create_day(date("2026-08-01")).await.unwrap();

        let note = Note::voice(day.id, "audio/mp4");
        store.add_note(&note).await.unwrap();
        store.put_audio(note.id, b"fake audio").await.unwrap();

        store.set_transcription(note.id, "hello diary").await.unwrap();

        let loaded = store.note(note.id).await.unwrap().unwrap();
        assert!(loaded.is_transcribed);
        assert_eq!(loaded.transcription.as_deref(), Some("hello diary"));
        assert_eq!(store.audio(note.id).await.unwrap().unwrap(), b"fake audio");
    }

    #[tokio::test]
    async fn test_notes_ordered_by_creation_time() {
        let (store, _temp) = test_store();
        let day = store.get_or_create_day(date("2026-08-01")).await.unwrap();

        let mut early = Note::text(day.id, "morning");
        let mut late = Note::text(day.id, "evening");
        early.created_at = "2026-08-01T08:00:00Z".parse().unwrap();
        late.created_at = "2026-08-01T20:00:00Z".parse().unwrap();

        // Insert out of order
        store.add_note(&late).await.unwrap();
        store.add_note(&early).await.unwrap();

        let notes = store.notes_for_day(day.id).await.unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].transcription.as_deref(), Some("morning"));
        assert_eq!(notes[1].transcription.as_deref(), Some("evening"));
    }

    #[tokio::test]
    async fn test_apply_summary_overwrites_as_unit() {
        let (store, _temp) = test_store();
        let day = store.get_or_create_day(date("2026-08-01")).await.unwrap();

        let update = DaySummaryUpdate {
            summary: "A calm day.".to_string(),
            mood: "🙂".to_string(),
            learnings: vec!["rest helps".to_string()],
            person_ids: vec![Uuid::new_v4()],
            tag_ids: vec![],
            summarized_at: chrono::Utc::now(),
        };
        store.apply_summary(day.id, update).await.unwrap();

        let loaded = store.day(day.id).await.unwrap().unwrap();
        assert_eq!(loaded.summary.as_deref(), Some("A calm day."));
        assert_eq!(loaded.mood.as_deref(), Some("🙂"));
        assert_eq!(loaded.learnings, vec!["rest helps"]);
        assert_eq!(loaded.person_ids.len(), 1);
        assert!(loaded.summarized_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_day_cascades_to_notes_and_audio() {
        let (store, _temp) = test_store();
        let day = store.get_or_create_day(date("2026-08-01")).await.unwrap();
        let other = store.get_or_create_day(date("2026-08-02")).await.unwrap();

        let doomed = Note::voice(day.id, "audio/mp4");
        let kept = Note::text(other.id, "survives");
        store.add_note(&doomed).await.unwrap();
        store.put_audio(doomed.id, b"bytes").await.unwrap();
        store.add_note(&kept).await.unwrap();

        store.delete_day(day.id).await.unwrap();

        assert!(store.day(day.id).await.unwrap().is_none());
        assert!(store.note(doomed.id).await.unwrap().is_none());
        assert!(store.audio(doomed.id).await.unwrap().is_none());
        assert!(store.note(kept.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_qa_is_append_only() {
        let (store, _temp) = test_store();
        let day = store.get_or_create_day(date("2026-08-01")).await.unwrap();

        let first = vec![QaPair {
            question: "How did the morning feel?".to_string(),
            answer: "Slow but good.".to_string(),
        }];
        let second = vec![QaPair {
            question: "What did you learn?".to_string(),
            answer: "To take breaks.".to_string(),
        }];

        store.append_qa(day.id, &first).await.unwrap();
        store.append_qa(day.id, &second).await.unwrap();

        let loaded = store.day(day.id).await.unwrap().unwrap();
        assert_eq!(loaded.qa.len(), 2);
        assert_eq!(loaded.qa[0].question, "How did the morning feel?");
        assert_eq!(loaded.qa[1].answer, "To take breaks.");
    }
}
