//! JSONL-based durable job log.
//!
//! Append-only: every state change is a new line, and the current queue is
//! derived by replaying the log. A deleted (successful) job vanishes from
//! the derived state; a failed one stays visible in `Error` until the user
//! deletes and re-enqueues it.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Job, JobKind, JobStatus};

/// Errors that can occur with the job log
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state transition: {from:?} → {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An event in the job log (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The job this event belongs to
    pub job_id: Uuid,

    /// Type of event
    pub event_type: JobEventType,

    /// Additional data (depends on event type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Types of job events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventType {
    /// Job added to the queue
    Enqueued,

    /// Worker started processing
    Started,

    /// Live progress update from the provider callback
    Progress,

    /// Processing failed permanently
    Failed,

    /// Job removed (the success path)
    Deleted,
}

/// Payload of an Enqueued event
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnqueuedData {
    note_id: Uuid,
    kind: JobKind,
}

/// Payload of a Progress event
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressData {
    progress: u8,
    message: String,
}

/// JSONL-backed job log
#[derive(Debug, Clone)]
pub struct JobLog {
    /// Path to the log file
    path: PathBuf,
}

impl JobLog {
    /// Create a log at a path (file created on first append).
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an event to the log.
    async fn append_event(&self, event: &JobEvent) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay all events to build the current job map.
    pub async fn replay(&self) -> Result<HashMap<Uuid, Job>, QueueError> {
        let mut jobs: HashMap<Uuid, Job> = HashMap::new();

        if !self.path.exists() {
            return Ok(jobs);
        }

        let file = File::open(&self.path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let event: JobEvent = serde_json::from_str(&line)?;
            Self::apply_event(&mut jobs, event);
        }

        Ok(jobs)
    }

    /// Apply a single event to the derived state.
    fn apply_event(jobs: &mut HashMap<Uuid, Job>, event: JobEvent) {
        match event.event_type {
            JobEventType::Enqueued => {
                if let Some(data) = event.data {
                    if let Ok(data) = serde_json::from_value::<EnqueuedData>(data) {
                        jobs.insert(
                            event.job_id,
                            Job {
                                id: event.job_id,
                                note_id: data.note_id,
                                kind: data.kind,
                                status: JobStatus::Pending,
                                progress: 0,
                                message: "Queued".to_string(),
                                error: None,
                                created_at: event.timestamp,
                            },
                        );
                    }
                }
            }
            JobEventType::Started => {
                if let Some(job) = jobs.get_mut(&event.job_id) {
                    job.status = JobStatus::Processing;
                    job.progress = 5;
                    job.message = "Starting transcription".to_string();
                }
            }
            JobEventType::Progress => {
                if let Some(job) = jobs.get_mut(&event.job_id) {
                    if let Some(data) = event.data {
                        if let Ok(data) = serde_json::from_value::<ProgressData>(data) {
                            job.progress = data.progress;
                            job.message = data.message;
                        }
                    }
                }
            }
            JobEventType::Failed => {
                if let Some(job) = jobs.get_mut(&event.job_id) {
                    job.status = JobStatus::Error;
                    if let Some(error) = event
                        .data
                        .as_ref()
                        .and_then(|d| d.get("error"))
                        .and_then(|e| e.as_str())
                    {
                        job.error = Some(error.to_string());
                        job.message = error.to_string();
                    }
                }
            }
            JobEventType::Deleted => {
                jobs.remove(&event.job_id);
            }
        }
    }

    /// Enqueue a new job for a note.
    pub async fn enqueue(&self, note_id: Uuid, kind: JobKind) -> Result<Job, QueueError> {
        self.enqueue_at(note_id, kind, Utc::now()).await
    }

    /// Enqueue with an explicit creation time (FIFO ordering key).
    pub async fn enqueue_at(
        &self,
        note_id: Uuid,
        kind: JobKind,
        created_at: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let job = Job::new(note_id, kind, created_at);

        let event = JobEvent {
            timestamp: created_at,
            job_id: job.id,
            event_type: JobEventType::Enqueued,
            data: Some(serde_json::to_value(EnqueuedData {
                note_id,
                kind,
            })?),
        };
        self.append_event(&event).await?;

        Ok(job)
    }

    /// All pending jobs, oldest enqueue first (strict FIFO order).
    pub async fn pending(&self) -> Result<Vec<Job>, QueueError> {
        let jobs = self.replay().await?;
        let mut pending: Vec<Job> = jobs
            .into_values()
            .filter(|j| j.status == JobStatus::Pending)
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(pending)
    }

    /// Mark a job as processing. Only valid from Pending.
    pub async fn mark_started(&self, id: Uuid) -> Result<(), QueueError> {
        let jobs = self.replay().await?;
        let job = jobs.get(&id).ok_or(QueueError::NotFound(id))?;

        if job.status != JobStatus::Pending {
            return Err(QueueError::InvalidTransition {
                from: job.status,
                to: JobStatus::Processing,
            });
        }

        self.append_event(&JobEvent {
            timestamp: Utc::now(),
            job_id: id,
            event_type: JobEventType::Started,
            data: None,
        })
        .await
    }

    /// Record a live progress update for a job.
    pub async fn record_progress(
        &self,
        id: Uuid,
        progress: u8,
        message: &str,
    ) -> Result<(), QueueError> {
        self.append_event(&JobEvent {
            timestamp: Utc::now(),
            job_id: id,
            event_type: JobEventType::Progress,
            data: Some(serde_json::to_value(ProgressData {
                progress,
                message: message.to_string(),
            })?),
        })
        .await
    }

    /// Mark a job as failed. Terminal: the job stays for inspection.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        self.append_event(&JobEvent {
            timestamp: Utc::now(),
            job_id: id,
            event_type: JobEventType::Failed,
            data: Some(serde_json::json!({ "error": error })),
        })
        .await
    }

    /// Remove a job (the success path, or a manual retry reset).
    pub async fn delete(&self, id: Uuid) -> Result<(), QueueError> {
        self.append_event(&JobEvent {
            timestamp: Utc::now(),
            job_id: id,
            event_type: JobEventType::Deleted,
            data: None,
        })
        .await
    }

    /// Get a specific job by id.
    pub async fn job(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let jobs = self.replay().await?;
        Ok(jobs.get(&id).cloned())
    }

    /// Queue status summary.
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let jobs = self.replay().await?;

        let mut status = QueueStatus::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => status.pending += 1,
                JobStatus::Processing => status.processing += 1,
                JobStatus::Error => status.failed += 1,
            }
        }

        Ok(status)
    }
}

/// Queue status summary
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
}

impl QueueStatus {
    /// Total jobs currently visible in the queue
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.failed
    }
}
