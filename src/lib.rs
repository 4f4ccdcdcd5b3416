//! dagbok - an AI-assisted voice diary
//!
//! Voice and text notes go in; a structured diary comes out. Notes are
//! transcribed through a durable job queue, then synthesized into a
//! per-day narrative with mood, learnings, and extracted people/tags.
//!
//! # Architecture
//!
//! - Notes and days live as JSON collections in a file store
//! - Transcription runs through an append-only JSONL job queue with a
//!   single background worker; state is derived by replaying the log
//! - Inference goes through one provider trait with three backends:
//!   cloud (schema-constrained), local (lazily-loaded model server),
//!   and on-device (ephemeral helper sessions)
//!
//! # Modules
//!
//! - `providers`: The inference backends
//! - `queue`: Durable job log and the transcription worker
//! - `pipeline`: Transcription, summarization, and Q&A flows
//! - `resolve`: Case-insensitive people/tag deduplication
//! - `store`: File-backed diary storage
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Capture and transcribe a voice note
//! dagbok note morning.m4a
//!
//! # Generate today's diary entry
//! dagbok summarize
//!
//! # Reflect on the day
//! dagbok questions
//! dagbok answer "What made you laugh?" "The dog chasing its tail"
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod resolve;
pub mod store;

// Re-export main types at crate root for convenience
pub use config::Settings;
pub use domain::{Day, Job, JobKind, JobStatus, Note, Person, QaPair, Tag};
pub use pipeline::{DiaryPipeline, PipelineError};
pub use providers::{DaySummary, InferenceProvider, ProviderError};
pub use queue::{DrainOutcome, JobLog, TranscriptionWorker, WorkerHandle};
pub use store::DiaryStore;
