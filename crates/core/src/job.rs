//! Job lifecycle model.
//!
//! A job starts in [`JobStatus::Processing`] with progress 0 and ends in
//! exactly one terminal status. All state changes go through
//! [`JobState::apply`] so the progress and terminal rules live in one place.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Highest progress value a non-terminal job may report.
pub const PROGRESS_CEILING: u8 = 99;

/// Progress value of a completed job.
pub const PROGRESS_COMPLETE: u8 = 100;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    /// `Complete` and `Error` are terminal; nothing leaves them.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Observable state of one job, as returned to status pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobState {
    pub status: JobStatus,
    /// Percentage in `0..=100`; never decreases while processing.
    pub progress: u8,
    /// Produced output filenames, empty until the job completes.
    #[serde(rename = "files")]
    pub result_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Public URL of the delivered archive (remote destinations only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A single mutation applied to a job by its worker.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// Report progress; clamped to [`PROGRESS_CEILING`].
    Progress(u8),
    /// Mark the job complete with its output files.
    Complete {
        files: Vec<String>,
        result_url: Option<String>,
    },
    /// Mark the job failed with a human-readable message.
    Fail(String),
}

impl JobState {
    /// Initial state recorded at acceptance time.
    pub fn processing() -> Self {
        let now = Utc::now();
        Self {
            status: JobStatus::Processing,
            progress: 0,
            result_files: Vec::new(),
            error_message: None,
            result_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `update`, returning whether it was accepted.
    ///
    /// Rejected updates leave the state untouched:
    /// - anything after a terminal status,
    /// - progress lower than the last committed value.
    pub fn apply(&mut self, update: JobUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match update {
            JobUpdate::Progress(percent) => {
                let percent = percent.min(PROGRESS_CEILING);
                if percent < self.progress {
                    return false;
                }
                self.progress = percent;
            }
            JobUpdate::Complete { files, result_url } => {
                self.status = JobStatus::Complete;
                self.progress = PROGRESS_COMPLETE;
                self.result_files = files;
                self.result_url = result_url;
            }
            JobUpdate::Fail(message) => {
                self.status = JobStatus::Error;
                self.error_message = Some(message);
            }
        }

        self.updated_at = Utc::now();
        true
    }
}

/// Map a processing fraction in `0.0..=1.0` to a job percentage.
///
/// Out-of-range and non-finite fractions are clamped; the result never
/// exceeds [`PROGRESS_CEILING`] because 100 is reserved for completion.
pub fn progress_from_fraction(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    let percent = (fraction.clamp(0.0, 1.0) * 100.0).floor() as u8;
    percent.min(PROGRESS_CEILING)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
