//! Job registry: the single source of truth for job state.
//!
//! Workers write through [`JobRegistry::update`]; status pollers read
//! snapshots through [`JobRegistry::get`]. The lifecycle rules themselves
//! live in [`JobState::apply`], so every implementation enforces them the
//! same way.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::job::{JobState, JobUpdate};
use crate::types::{JobId, Timestamp};

/// Storage for job states, shared between the API and the workers.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Record a new job. Fails with [`CoreError::Conflict`] if the ID exists.
    async fn create(&self, job_id: &str, state: JobState) -> Result<(), CoreError>;

    /// Apply an update atomically. Returns `false` if the job is unknown or
    /// the update was rejected by the lifecycle rules.
    async fn update(&self, job_id: &str, update: JobUpdate) -> bool;

    /// Snapshot of a job's state.
    async fn get(&self, job_id: &str) -> Option<JobState>;

    /// Forget a job. Returns whether it existed.
    async fn delete(&self, job_id: &str) -> bool;

    /// Terminal jobs whose last update is older than `cutoff`.
    async fn expired(&self, cutoff: Timestamp) -> Vec<JobId>;

    /// Number of jobs still processing.
    async fn active_count(&self) -> usize;
}

/// Process-local registry backed by a `RwLock<HashMap>`.
///
/// Designed to be wrapped in `Arc` and shared across the application.
#[derive(Default)]
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, JobState>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn create(&self, job_id: &str, state: JobState) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return Err(CoreError::Conflict(format!("Job '{job_id}' already exists")));
        }
        jobs.insert(job_id.to_string(), state);
        Ok(())
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(state) => {
                let accepted = state.apply(update);
                if !accepted {
                    tracing::debug!(job_id, status = state.status.name(), "Job update rejected");
                }
                accepted
            }
            None => {
                tracing::debug!(job_id, "Update for unknown job ignored");
                false
            }
        }
    }

    async fn get(&self, job_id: &str) -> Option<JobState> {
        self.jobs.read().await.get(job_id).cloned()
    }

    async fn delete(&self, job_id: &str) -> bool {
        self.jobs.write().await.remove(job_id).is_some()
    }

    async fn expired(&self, cutoff: Timestamp) -> Vec<JobId> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|(_, state)| state.status.is_terminal() && state.updated_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect()
    }

    async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|state| !state.status.is_terminal())
            .count()
    }
}
