//! Diary Pipeline Integration Tests
//!
//! Summarization, entity resolution and the Q&A enrichment round,
//! driven end to end against a temp store with a scripted backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;

use dagbok::config::Settings;
use dagbok::domain::{Note, QaPair};
use dagbok::pipeline::{DiaryPipeline, PipelineError};
use dagbok::providers::{DaySummary, InferenceProvider, Progress, ProviderError};
use dagbok::store::DiaryStore;

/// Scripted summarization backend returning a fixed DaySummary and
/// counting calls.
struct FakeSummarizer {
    summary: DaySummary,
    questions: Vec<String>,
    fail_malformed: bool,
    summarize_calls: AtomicUsize,
    question_calls: AtomicUsize,
}

impl FakeSummarizer {
    fn returning(summary: DaySummary) -> Self {
        Self {
            summary,
            questions: vec![
                "What made you laugh today?".to_string(),
                "What would you do differently?".to_string(),
            ],
            fail_malformed: false,
            summarize_calls: AtomicUsize::new(0),
            question_calls: AtomicUsize::new(0),
        }
    }

    fn malformed() -> Self {
        Self {
            fail_malformed: true,
            ..Self::returning(DaySummary::default())
        }
    }

    fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for FakeSummarizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn transcribe(
        &self,
        _audio: &[u8],
        _mime: &str,
        _progress: Progress<'_>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable("not a transcriber".to_string()))
    }

    async fn summarize(
        &self,
        _transcript: &str,
        _qa: &[QaPair],
        _prompt_template: &str,
        _progress: Progress<'_>,
    ) -> Result<DaySummary, ProviderError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_malformed {
            return Err(ProviderError::Malformed("no json here".to_string()));
        }
        Ok(self.summary.clone())
    }

    async fn generate_questions(
        &self,
        _transcript: &str,
        _prompt_template: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.question_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.questions.clone())
    }
}

fn sample_summary() -> DaySummary {
    DaySummary {
        summary: "A calm day with a long swim and dinner with Alicia.".to_string(),
        mood: "🙂".to_string(),
        learnings: vec!["Cold water wakes you up".to_string()],
        people_mentioned: vec!["Alicia".to_string()],
        tags_mentioned: vec!["Swimming".to_string(), "Dinner".to_string()],
    }
}

fn test_pipeline(
    temp: &TempDir,
    summarizer: Arc<FakeSummarizer>,
) -> (DiaryStore, DiaryPipeline) {
    let settings = Settings::defaults_at(temp.path());
    let store = DiaryStore::open(settings.store_dir());

    let pipeline = DiaryPipeline::new(
        store.clone(),
        summarizer.clone() as Arc<dyn InferenceProvider>,
        summarizer as Arc<dyn InferenceProvider>,
        &settings,
    );
    (store, pipeline)
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 2).unwrap()
}

/// Seed a day with one transcribed note.
async fn seed_day(store: &DiaryStore, text: &str) {
    let day = store.get_or_create_day(date()).await.unwrap();
    let note = Note::text(day.id, text);
    store.add_note(&note).await.unwrap();
}

#[tokio::test]
async fn test_summarize_day_writes_everything_atomically() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::returning(sample_summary()));
    let (store, pipeline) = test_pipeline(&temp, summarizer.clone());

    seed_day(&store, "went swimming, had dinner with Alicia").await;

    let result = pipeline.summarize_day(date(), None).await.unwrap();
    assert_eq!(result.mood, "🙂");

    let day = store.day_by_date(date()).await.unwrap().unwrap();
    assert_eq!(
        day.summary.as_deref(),
        Some("A calm day with a long swim and dinner with Alicia.")
    );
    assert_eq!(day.mood.as_deref(), Some("🙂"));
    assert_eq!(day.learnings, vec!["Cold water wakes you up"]);
    assert_eq!(day.person_ids.len(), 1);
    assert_eq!(day.tag_ids.len(), 2);
    assert!(day.summarized_at.is_some());

    // The catalog gained the extracted entities with default metadata
    let people = store.people().await.unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].name, "Alicia");
    assert_eq!(people[0].role, "Friend/Family");
}

#[tokio::test]
async fn test_no_day_is_no_data_without_a_provider_call() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::returning(sample_summary()));
    let (_store, pipeline) = test_pipeline(&temp, summarizer.clone());

    let result = pipeline.summarize_day(date(), None).await;
    assert!(matches!(result, Err(PipelineError::NoData)));
    assert_eq!(summarizer.summarize_calls(), 0);
}

#[tokio::test]
async fn test_untranscribed_notes_are_no_data_and_day_is_untouched() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::returning(sample_summary()));
    let (store, pipeline) = test_pipeline(&temp, summarizer.clone());

    // Only a voice note still awaiting transcription
    let day = store.get_or_create_day(date()).await.unwrap();
    let note = Note::voice(day.id, "audio/mp4");
    store.add_note(&note).await.unwrap();

    let result = pipeline.summarize_day(date(), None).await;
    assert!(matches!(result, Err(PipelineError::NoData)));
    assert_eq!(summarizer.summarize_calls(), 0);

    let day = store.day_by_date(date()).await.unwrap().unwrap();
    assert!(day.summary.is_none());
    assert!(day.summarized_at.is_none());
}

#[tokio::test]
async fn test_resummarizing_does_not_duplicate_entities() {
    let temp = TempDir::new().unwrap();

    // Second run mentions the same person in a different case
    let mut recased = sample_summary();
    recased.people_mentioned = vec!["ALICIA".to_string()];
    recased.tags_mentioned = vec!["swimming".to_string()];

    let first = Arc::new(FakeSummarizer::returning(sample_summary()));
    let second = Arc::new(FakeSummarizer::returning(recased));

    let (store, pipeline) = test_pipeline(&temp, first);
    seed_day(&store, "swim with Alicia").await;
    pipeline.summarize_day(date(), None).await.unwrap();

    let settings = Settings::defaults_at(temp.path());
    let pipeline = DiaryPipeline::new(
        store.clone(),
        second.clone() as Arc<dyn InferenceProvider>,
        second as Arc<dyn InferenceProvider>,
        &settings,
    );
    pipeline.summarize_day(date(), None).await.unwrap();

    // Same person and tag, matched case-insensitively; originals kept
    let people = store.people().await.unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].name, "Alicia");

    let tags = store.tags().await.unwrap();
    assert_eq!(tags.iter().filter(|t| t.name.eq_ignore_ascii_case("swimming")).count(), 1);
}

#[tokio::test]
async fn test_generate_questions_never_mutates_the_day() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::returning(sample_summary()));
    let (store, pipeline) = test_pipeline(&temp, summarizer.clone());

    seed_day(&store, "quiet evening").await;
    let before = store.day_by_date(date()).await.unwrap().unwrap();

    let questions = pipeline.generate_questions(date()).await.unwrap();
    assert_eq!(questions.len(), 2);

    let after = store.day_by_date(date()).await.unwrap().unwrap();
    assert!(after.qa.is_empty());
    assert_eq!(after.summary, before.summary);
    assert_eq!(summarizer.summarize_calls(), 0);
}

#[tokio::test]
async fn test_save_answers_appends_and_resummarizes_once() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::returning(sample_summary()));
    let (store, pipeline) = test_pipeline(&temp, summarizer.clone());

    seed_day(&store, "a full day").await;

    let answers = vec![
        QaPair {
            question: "What made you laugh?".to_string(),
            answer: "The seagull stealing a sandwich.".to_string(),
        },
        QaPair {
            question: "What was hard?".to_string(),
            answer: "   ".to_string(),
        },
        QaPair {
            question: "Who helped you?".to_string(),
            answer: "Alicia did.".to_string(),
        },
    ];

    pipeline.save_answers(date(), &answers, None).await.unwrap();

    // Blank answer dropped, the rest appended, exactly one re-summarization
    let day = store.day_by_date(date()).await.unwrap().unwrap();
    assert_eq!(day.qa.len(), 2);
    assert_eq!(day.qa[0].answer, "The seagull stealing a sandwich.");
    assert_eq!(day.qa[1].question, "Who helped you?");
    assert!(day.summary.is_some());
    assert_eq!(summarizer.summarize_calls(), 1);
}

#[tokio::test]
async fn test_answers_accumulate_across_rounds() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::returning(sample_summary()));
    let (store, pipeline) = test_pipeline(&temp, summarizer);

    seed_day(&store, "busy day").await;

    let round_one = vec![QaPair {
        question: "Q1".to_string(),
        answer: "A1".to_string(),
    }];
    let round_two = vec![QaPair {
        question: "Q2".to_string(),
        answer: "A2".to_string(),
    }];

    pipeline.save_answers(date(), &round_one, None).await.unwrap();
    pipeline.save_answers(date(), &round_two, None).await.unwrap();

    let day = store.day_by_date(date()).await.unwrap().unwrap();
    assert_eq!(day.qa.len(), 2);
    assert_eq!(day.qa[0].question, "Q1");
    assert_eq!(day.qa[1].question, "Q2");
}

#[tokio::test]
async fn test_malformed_backend_reply_surfaces_as_typed_error() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::malformed());
    let (store, pipeline) = test_pipeline(&temp, summarizer);

    seed_day(&store, "a day the model mangles").await;

    let result = pipeline.summarize_day(date(), None).await;
    assert!(matches!(
        result,
        Err(PipelineError::Provider(ProviderError::Malformed(_)))
    ));

    // Nothing was written
    let day = store.day_by_date(date()).await.unwrap().unwrap();
    assert!(day.summary.is_none());
    assert!(day.summarized_at.is_none());
}

#[tokio::test]
async fn test_transcript_excludes_blank_notes() {
    let temp = TempDir::new().unwrap();
    let summarizer = Arc::new(FakeSummarizer::returning(sample_summary()));
    let (store, pipeline) = test_pipeline(&temp, summarizer.clone());

    let day = store.get_or_create_day(date()).await.unwrap();
    store.add_note(&Note::text(day.id, "   ")).await.unwrap();

    // Whitespace-only text is not usable material
    let result = pipeline.summarize_day(date(), None).await;
    assert!(matches!(result, Err(PipelineError::NoData)));
    assert_eq!(summarizer.summarize_calls(), 0);
}
