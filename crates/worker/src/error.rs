use std::time::Duration;

use mixbuster_pipeline::{DeliveryError, ResolutionError, SeparationError, StagingError};

/// Why a job ended in `Error`. The display text becomes the job's
/// `error_message`, prefixed with the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Model resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Separation failed: {0}")]
    Separation(#[from] SeparationError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Job timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Worker panicked: {0}")]
    Panicked(String),

    #[error("Internal worker error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Stage label used in structured logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Staging(_) => "staging",
            Self::Resolution(_) => "resolution",
            Self::Separation(_) => "separation",
            Self::Delivery(_) => "delivery",
            Self::TimedOut(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Panicked(_) => "panic",
            Self::Internal(_) => "internal",
        }
    }
}
