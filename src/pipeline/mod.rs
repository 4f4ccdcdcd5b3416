//! Foreground diary pipelines: transcription, summarization, questions.
//!
//! Stateless orchestration over the store, the inference providers and the
//! entity resolver. Summarization and question generation are user
//! triggered and propagate errors directly to the caller; the transcription
//! entry point is what the background worker drives per job.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::Settings;
use crate::domain::{Day, DaySummaryUpdate, QaPair};
use crate::providers::{report, DaySummary, InferenceProvider, Progress, ProviderError};
use crate::resolve::EntityResolver;
use crate::store::{DiaryStore, StoreError};

/// Errors from the diary pipelines
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No transcribed notes for this day")]
    NoData,

    #[error("Note {0} no longer exists")]
    SubjectMissing(Uuid),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The diary's AI pipelines, bound to one store and the providers chosen
/// at construction.
pub struct DiaryPipeline {
    store: DiaryStore,
    transcriber: Arc<dyn InferenceProvider>,
    summarizer: Arc<dyn InferenceProvider>,
    diary_prompt: String,
    questions_prompt: String,
}

impl DiaryPipeline {
    pub fn new(
        store: DiaryStore,
        transcriber: Arc<dyn InferenceProvider>,
        summarizer: Arc<dyn InferenceProvider>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            transcriber,
            summarizer,
            diary_prompt: settings.diary_prompt.clone(),
            questions_prompt: settings.questions_prompt.clone(),
        }
    }

    /// Transcribe one note and persist the text. Driven by the job queue
    /// worker; a note that already carries its text (typed notes) is a
    /// no-op success.
    #[instrument(skip(self, progress), fields(note_id = %note_id))]
    pub async fn transcribe_note(
        &self,
        note_id: Uuid,
        progress: Progress<'_>,
    ) -> Result<String, PipelineError> {
        let note = self
            .store
            .note(note_id)
            .await?
            .ok_or(PipelineError::SubjectMissing(note_id))?;

        if note.is_transcribed {
            if let Some(text) = note.transcription {
                report(progress, 100, "Done");
                return Ok(text);
            }
        }

        let audio = self
            .store
            .audio(note_id)
            .await?
            .ok_or(PipelineError::Provider(ProviderError::MediaMissing))?;
        let mime = note.audio_mime.as_deref().unwrap_or("audio/mp4");

        let text = self.transcriber.transcribe(&audio, mime, progress).await?;
        self.store.set_transcription(note_id, &text).await?;

        report(progress, 100, "Done");
        info!(chars = text.len(), "Note transcribed");
        Ok(text)
    }

    /// Collect the day's usable notes into one timestamped transcript.
    /// Untranscribed and blank notes are excluded; zero usable notes is
    /// `NoData` and nothing else happens.
    async fn gather_transcript(&self, date: NaiveDate) -> Result<(Day, String), PipelineError> {
        let day = self
            .store
            .day_by_date(date)
            .await?
            .ok_or(PipelineError::NoData)?;

        let notes = self.store.notes_for_day(day.id).await?;

        let lines: Vec<String> = notes
            .iter()
            .filter(|n| n.is_transcribed)
            .filter_map(|n| {
                let text = n.transcription.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                Some(format!("[{}] {}", n.created_at.format("%H:%M"), text))
            })
            .collect();

        if lines.is_empty() {
            return Err(PipelineError::NoData);
        }

        Ok((day, lines.join("\n\n")))
    }

    /// Synthesize the day narrative, resolve extracted entities, and write
    /// the result to the Day as one atomic update.
    #[instrument(skip(self, progress), fields(date = %date))]
    pub async fn summarize_day(
        &self,
        date: NaiveDate,
        progress: Progress<'_>,
    ) -> Result<DaySummary, PipelineError> {
        let (day, transcript) = self.gather_transcript(date).await?;

        let summary = self
            .summarizer
            .summarize(&transcript, &day.qa, &self.diary_prompt, progress)
            .await?;

        let resolver = EntityResolver::new(&self.store);
        let person_ids = resolver.resolve_people(&summary.people_mentioned).await?;
        let tag_ids = resolver.resolve_tags(&summary.tags_mentioned).await?;

        report(progress, 90, "Saving the diary");
        self.store
            .apply_summary(
                day.id,
                DaySummaryUpdate {
                    summary: summary.summary.clone(),
                    mood: summary.mood.clone(),
                    learnings: summary.learnings.clone(),
                    person_ids,
                    tag_ids,
                    summarized_at: Utc::now(),
                },
            )
            .await?;

        report(progress, 100, "Done");
        info!(
            people = summary.people_mentioned.len(),
            tags = summary.tags_mentioned.len(),
            "Day summarized"
        );

        Ok(summary)
    }

    /// Generate reflective follow-up questions for a day. Never mutates
    /// the Day; the Q&A history only grows when answers are saved.
    #[instrument(skip(self), fields(date = %date))]
    pub async fn generate_questions(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<String>, PipelineError> {
        let (_, transcript) = self.gather_transcript(date).await?;

        let questions = self
            .summarizer
            .generate_questions(&transcript, &self.questions_prompt)
            .await?;

        Ok(questions)
    }

    /// Append answered questions to the day and re-run summarization once
    /// so the narrative reflects the new answers. Pairs with a blank
    /// answer are dropped.
    #[instrument(skip(self, answers, progress), fields(date = %date))]
    pub async fn save_answers(
        &self,
        date: NaiveDate,
        answers: &[QaPair],
        progress: Progress<'_>,
    ) -> Result<DaySummary, PipelineError> {
        let day = self
            .store
            .day_by_date(date)
            .await?
            .ok_or(PipelineError::NoData)?;

        let answered: Vec<QaPair> = answers
            .iter()
            .filter(|p| !p.answer.trim().is_empty())
            .cloned()
            .collect();

        if !answered.is_empty() {
            self.store.append_qa(day.id, &answered).await?;
            info!(count = answered.len(), "Answers saved");
        }

        self.summarize_day(date, progress).await
    }

    /// The store this pipeline operates on.
    pub fn store(&self) -> &DiaryStore {
        &self.store
    }
}
