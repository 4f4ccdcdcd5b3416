//! Command-line driver for the diary engine.
//!
//! Thin by design: each command builds the store/providers/worker from
//! settings, calls one library operation, and prints the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Settings;
use crate::domain::{JobKind, JobStatus, Note, QaPair};
use crate::pipeline::DiaryPipeline;
use crate::providers::{summary_provider, transcription_provider, InferenceProvider};
use crate::queue::{DrainOutcome, JobLog, TranscriptionWorker};
use crate::store::DiaryStore;

/// dagbok - voice notes in, a structured diary out
#[derive(Parser)]
#[command(name = "dagbok", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a voice note and transcribe it
    Note {
        /// Audio file to ingest
        audio: PathBuf,

        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Diary date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Capture a typed note
    Text {
        /// The note text
        message: String,

        /// Diary date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show the queue status and any failed jobs
    Status,

    /// Re-enqueue a failed job
    Retry {
        /// Id of the failed job
        job_id: Uuid,
    },

    /// Generate the day's diary entry
    Summarize {
        /// Diary date (defaults to today)
        date: Option<NaiveDate>,
    },

    /// Generate reflective questions about a day
    Questions {
        /// Diary date (defaults to today)
        date: Option<NaiveDate>,
    },

    /// Answer a reflective question and refresh the diary entry
    Answer {
        /// The question being answered
        question: String,

        /// Your answer
        answer: String,

        /// Diary date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show a day's diary entry
    Show {
        /// Diary date (defaults to today)
        date: Option<NaiveDate>,
    },
}

/// Everything a command needs, built once from settings.
struct Engine {
    store: DiaryStore,
    worker: TranscriptionWorker,
    pipeline: Arc<DiaryPipeline>,
}

impl Engine {
    fn build(settings: &Settings) -> Self {
        let store = DiaryStore::open(settings.store_dir());
        let transcriber: Arc<dyn InferenceProvider> = Arc::from(transcription_provider(settings));
        let summarizer: Arc<dyn InferenceProvider> = Arc::from(summary_provider(settings));

        let pipeline = Arc::new(DiaryPipeline::new(
            store.clone(),
            transcriber,
            summarizer,
            settings,
        ));
        let worker = TranscriptionWorker::new(JobLog::new(settings.queue_path()), pipeline.clone());

        Self {
            store,
            worker,
            pipeline,
        }
    }
}

/// Guess a MIME type from the audio file extension.
fn mime_for_extension(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn print_progress(percent: u8, message: &str) {
    println!("  {:>3}% {}", percent, message);
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load()?;
        let engine = Engine::build(&settings);

        match self.command {
            Commands::Note { audio, mime, date } => {
                let bytes = tokio::fs::read(&audio)
                    .await
                    .with_context(|| format!("Failed to read {}", audio.display()))?;
                let mime = mime.unwrap_or_else(|| mime_for_extension(&audio).to_string());

                let day = engine
                    .store
                    .get_or_create_day(date.unwrap_or_else(today))
                    .await?;
                let note = Note::voice(day.id, mime);
                engine.store.add_note(&note).await?;
                engine.store.put_audio(note.id, &bytes).await?;

                let job = engine.worker.enqueue(note.id, JobKind::Audio).await?;
                println!("Queued note {} (job {})", note.id, job.id);

                engine.worker.drain().await?;

                match engine.worker.log().job(job.id).await? {
                    None => {
                        let note = engine.store.note(note.id).await?;
                        let text = note
                            .and_then(|n| n.transcription)
                            .unwrap_or_default();
                        println!("Transcribed: {}", text);
                    }
                    Some(failed) => {
                        println!(
                            "Transcription failed: {}",
                            failed.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }

            Commands::Text { message, date } => {
                let day = engine
                    .store
                    .get_or_create_day(date.unwrap_or_else(today))
                    .await?;
                let note = Note::text(day.id, message);
                engine.store.add_note(&note).await?;
                println!("Saved text note {} to {}", note.id, day.date);
            }

            Commands::Status => {
                let status = engine.worker.log().status().await?;
                println!(
                    "Queue: {} pending, {} processing, {} failed",
                    status.pending, status.processing, status.failed
                );

                let jobs = engine.worker.log().replay().await?;
                for job in jobs.values().filter(|j| j.status == JobStatus::Error) {
                    println!(
                        "  failed {} (note {}): {}",
                        job.id,
                        job.note_id,
                        job.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }

            Commands::Retry { job_id } => {
                let job = engine
                    .worker
                    .log()
                    .job(job_id)
                    .await?
                    .context("Job not found")?;
                anyhow::ensure!(
                    job.status == JobStatus::Error,
                    "Job {} is not in error state",
                    job_id
                );

                // A failed job only re-enters the queue by delete + re-enqueue
                engine.worker.log().delete(job_id).await?;
                let fresh = engine.worker.enqueue(job.note_id, job.kind).await?;
                println!("Re-enqueued note {} as job {}", job.note_id, fresh.id);

                if let DrainOutcome::Drained { failed: 0, .. } = engine.worker.drain().await? {
                    println!("Done");
                }
            }

            Commands::Summarize { date } => {
                let date = date.unwrap_or_else(today);
                let summary = engine
                    .pipeline
                    .summarize_day(
                        date,
                        Some(&print_progress as &(dyn Fn(u8, &str) + Send + Sync)),
                    )
                    .await?;

                println!("\n{} {}\n", summary.mood, date);
                println!("{}", summary.summary);
                if !summary.learnings.is_empty() {
                    println!("\nLearnings:");
                    for learning in &summary.learnings {
                        println!("  - {}", learning);
                    }
                }
            }

            Commands::Questions { date } => {
                let questions = engine
                    .pipeline
                    .generate_questions(date.unwrap_or_else(today))
                    .await?;

                if questions.is_empty() {
                    println!("No questions this time.");
                }
                for (i, question) in questions.iter().enumerate() {
                    println!("{}. {}", i + 1, question);
                }
            }

            Commands::Answer {
                question,
                answer,
                date,
            } => {
                let pairs = vec![QaPair { question, answer }];
                engine
                    .pipeline
                    .save_answers(
                        date.unwrap_or_else(today),
                        &pairs,
                        Some(&print_progress as &(dyn Fn(u8, &str) + Send + Sync)),
                    )
                    .await?;
                println!("Answer saved and diary entry refreshed.");
            }

            Commands::Show { date } => {
                let date = date.unwrap_or_else(today);
                let day = engine
                    .store
                    .day_by_date(date)
                    .await?
                    .with_context(|| format!("No diary entry for {}", date))?;

                match (&day.summary, &day.mood) {
                    (Some(summary), mood) => {
                        println!("{} {}\n", mood.as_deref().unwrap_or(""), day.date);
                        println!("{}", summary);
                    }
                    _ => println!("{} has not been summarized yet.", day.date),
                }

                if !day.learnings.is_empty() {
                    println!("\nLearnings:");
                    for learning in &day.learnings {
                        println!("  - {}", learning);
                    }
                }

                if !day.person_ids.is_empty() {
                    let people = engine.store.people().await?;
                    let names: Vec<&str> = people
                        .iter()
                        .filter(|p| day.person_ids.contains(&p.id))
                        .map(|p| p.name.as_str())
                        .collect();
                    println!("\nPeople: {}", names.join(", "));
                }

                if !day.tag_ids.is_empty() {
                    let tags = engine.store.tags().await?;
                    let names: Vec<&str> = tags
                        .iter()
                        .filter(|t| day.tag_ids.contains(&t.id))
                        .map(|t| t.name.as_str())
                        .collect();
                    println!("Tags: {}", names.join(", "));
                }

                if !day.qa.is_empty() {
                    println!("\nReflections:");
                    for pair in &day.qa {
                        println!("  Q: {}", pair.question);
                        println!("  A: {}", pair.answer);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension(Path::new("note.m4a")), "audio/mp4");
        assert_eq!(mime_for_extension(Path::new("note.MP3")), "audio/mpeg");
        assert_eq!(
            mime_for_extension(Path::new("note")),
            "application/octet-stream"
        );
    }
}
