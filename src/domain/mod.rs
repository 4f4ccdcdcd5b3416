//! Domain types for the diary engine.
//!
//! This module contains the core data structures:
//! - Job: a queued unit of transcription work
//! - Day and Note: the diary aggregation units
//! - Person and Tag: catalog entries resolved from extracted names

pub mod diary;
pub mod job;

// Re-export commonly used types
pub use diary::{Day, DaySummaryUpdate, Note, Person, QaPair, Tag};
pub use job::{Job, JobKind, JobStatus};
