//! The durable transcription job queue.
//!
//! Two halves:
//!
//! 1. **Log**: append-only JSONL event log; current job state is derived
//!    by replay. Successful jobs disappear from the derived state, failed
//!    ones stay in error for inspection.
//! 2. **Worker**: single-worker drain loop with an explicit start/stop
//!    lifecycle, woken by enqueues instead of polling on a timer.
//!
//! ```text
//! capture → enqueue → jobs.jsonl → worker → provider → note.transcription
//! ```

pub mod log;
pub mod worker;

// Re-export key types
pub use log::{JobLog, QueueError, QueueStatus};
pub use worker::{DrainOutcome, TranscriptionWorker, WorkerHandle};
