//! Transcription job records.
//!
//! A Job ties one queued unit of AI work to a Note. Jobs are owned by the
//! queue: the queue creates them, the worker mutates them, and a successful
//! job is removed entirely while a failed one is kept for inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of capture the job processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A voice recording that needs transcription
    Audio,

    /// A typed note that already carries its text
    Text,
}

/// Lifecycle status of a job.
///
/// There is no terminal "done" variant: success deletes the record. A failed
/// job stays in `Error` until the user deletes and re-enqueues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the worker
    Pending,

    /// Currently being processed (at most one at a time)
    Processing,

    /// Failed permanently; kept for manual inspection
    Error,
}

/// A queued unit of transcription work tied to one Note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: Uuid,

    /// The note this job processes
    pub note_id: Uuid,

    /// Audio or text capture
    pub kind: JobKind,

    /// Current status
    pub status: JobStatus,

    /// Progress 0-100, updated live by the provider callback
    pub progress: u8,

    /// Human-readable progress message
    pub message: String,

    /// Error message (only set when status is Error)
    pub error: Option<String>,

    /// When the job was enqueued; drives FIFO ordering
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh pending job for a note.
    pub fn new(note_id: Uuid, kind: JobKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            note_id,
            kind,
            status: JobStatus::Pending,
            progress: 0,
            message: "Queued".to_string(),
            error: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let note_id = Uuid::new_v4();
        let job = Job::new(note_id, JobKind::Audio, Utc::now());

        assert_eq!(job.note_id, note_id);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_job_serialization() {
        let job = Job::new(Uuid::new_v4(), JobKind::Text, Utc::now());

        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.kind, JobKind::Text);
        assert_eq!(parsed.status, JobStatus::Pending);
    }
}
