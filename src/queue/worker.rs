//! Single-worker drain loop for the transcription queue.
//!
//! The worker is an explicit object with a start/stop lifecycle. Exactly
//! one job is processed at a time, in strict enqueue order; a drain
//! triggered while another is running is a no-op. Instead of repolling on
//! a timer, the worker sleeps until an enqueue wakes it.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Job, JobKind};
use crate::pipeline::DiaryPipeline;

use super::log::{JobLog, QueueError};

/// Outcome of one drain attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was already running; nothing done
    Busy,

    /// Queue was empty
    Idle,

    /// Jobs were processed
    Drained { processed: usize, failed: usize },
}

struct WorkerInner {
    log: JobLog,
    pipeline: Arc<DiaryPipeline>,

    /// Wakes the worker task when new work arrives
    wake: Notify,

    /// Held for the duration of a drain; enforces mutual exclusion
    drain_lock: Mutex<()>,
}

/// The background transcription worker.
#[derive(Clone)]
pub struct TranscriptionWorker {
    inner: Arc<WorkerInner>,
}

impl TranscriptionWorker {
    pub fn new(log: JobLog, pipeline: Arc<DiaryPipeline>) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                log,
                pipeline,
                wake: Notify::new(),
                drain_lock: Mutex::new(()),
            }),
        }
    }

    /// Enqueue a job for a note and wake the worker. If a drain is
    /// running, this only appends; the drain's next pick finds the job.
    pub async fn enqueue(&self, note_id: Uuid, kind: JobKind) -> Result<Job, QueueError> {
        let job = self.inner.log.enqueue(note_id, kind).await?;
        debug!(job_id = %job.id, %note_id, "Job enqueued");

        self.inner.wake.notify_one();
        Ok(job)
    }

    /// Run one drain: process pending jobs oldest-first until none remain.
    /// Returns `Busy` without touching the queue if a drain is already
    /// active.
    pub async fn drain(&self) -> Result<DrainOutcome, QueueError> {
        let Ok(_guard) = self.inner.drain_lock.try_lock() else {
            return Ok(DrainOutcome::Busy);
        };

        let mut processed = 0;
        let mut failed = 0;

        loop {
            let pending = self.inner.log.pending().await?;
            let Some(job) = pending.into_iter().next() else {
                break;
            };

            if self.process_job(&job).await? {
                processed += 1;
            } else {
                failed += 1;
            }
        }

        if processed == 0 && failed == 0 {
            Ok(DrainOutcome::Idle)
        } else {
            Ok(DrainOutcome::Drained { processed, failed })
        }
    }

    /// Process one job to completion. Any pipeline error becomes the
    /// job's terminal error state; only log IO errors propagate.
    async fn process_job(&self, job: &Job) -> Result<bool, QueueError> {
        info!(job_id = %job.id, note_id = %job.note_id, "Processing job");
        self.inner.log.mark_started(job.id).await?;

        // Provider progress callbacks are synchronous; bridge them to the
        // async log through a channel drained by a side task.
        let (tx, mut rx) = mpsc::unbounded_channel::<(u8, String)>();
        let writer = tokio::spawn({
            let log = self.inner.log.clone();
            let job_id = job.id;
            async move {
                while let Some((percent, message)) = rx.recv().await {
                    if let Err(e) = log.record_progress(job_id, percent, &message).await {
                        warn!(%job_id, "Failed to record progress: {}", e);
                    }
                }
            }
        });

        let callback = move |percent: u8, message: &str| {
            let _ = tx.send((percent, message.to_string()));
        };

        let result = self
            .inner
            .pipeline
            .transcribe_note(
                job.note_id,
                Some(&callback as &(dyn Fn(u8, &str) + Send + Sync)),
            )
            .await;

        // Close the channel so the writer finishes before the terminal
        // event is appended.
        drop(callback);
        let _ = writer.await;

        match result {
            Ok(_) => {
                self.inner.log.delete(job.id).await?;
                info!(job_id = %job.id, "Job completed");
                Ok(true)
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Job failed");
                self.inner.log.mark_failed(job.id, &e.to_string()).await?;
                Ok(false)
            }
        }
    }

    /// Start the background worker task. It drains immediately (picking up
    /// jobs left from a previous run), then sleeps until woken by an
    /// enqueue. Errors never terminate the loop.
    pub fn start(&self) -> WorkerHandle {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let worker = self.clone();

        let task = tokio::spawn(async move {
            info!("Transcription worker started");

            loop {
                if let Err(e) = worker.drain().await {
                    error!("Queue drain failed: {}", e);
                }

                tokio::select! {
                    _ = worker.inner.wake.notified() => {}
                    _ = stop_rx.recv() => {
                        info!("Transcription worker stopping...");
                        break;
                    }
                }
            }
        });

        WorkerHandle { stop_tx, task }
    }

    /// The underlying durable log.
    pub fn log(&self) -> &JobLog {
        &self.inner.log
    }
}

/// Handle to control a running worker
pub struct WorkerHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the worker after its current drain finishes.
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}
