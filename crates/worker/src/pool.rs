//! Job admission and the bounded worker pool.
//!
//! [`JobDispatcher::submit`] registers a job and hands it to a bounded
//! queue without waiting for it to run. [`WorkerPool::run`] drains the
//! queue, running at most `max_concurrent_jobs` jobs at once, each under
//! its own cancellation token and timeout. The tokens live in
//! [`JobCancellations`] from admission until the job finishes, so a job
//! can be cancelled whether it is queued or running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use mixbuster_core::error::CoreError;
use mixbuster_core::job::JobState;
use mixbuster_core::naming::{new_job_id, validate_job_id};
use mixbuster_core::registry::JobRegistry;
use mixbuster_core::request::JobRequest;
use mixbuster_core::types::JobId;

use crate::error::WorkerError;
use crate::worker::SeparationWorker;

/// A job accepted by the dispatcher and waiting for a worker.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub request: JobRequest,
}

// ---------------------------------------------------------------------------
// JobCancellations
// ---------------------------------------------------------------------------

/// Cancellation tokens of admitted jobs, keyed by job ID.
///
/// Every token is a child of `parent`, so cancelling the parent (engine
/// shutdown) reaches every admitted job.
#[derive(Clone)]
pub struct JobCancellations {
    parent: CancellationToken,
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl Default for JobCancellations {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl JobCancellations {
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            parent,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create and remember the token for `job_id`.
    pub fn register(&self, job_id: &str) -> CancellationToken {
        let token = self.parent.child_token();
        self.lock().insert(job_id.to_string(), token.clone());
        token
    }

    /// The registered token, or a fresh child of the parent for a job that
    /// was never registered.
    pub fn token(&self, job_id: &str) -> CancellationToken {
        self.lock()
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| self.parent.child_token())
    }

    /// Fire the token of `job_id`. Returns whether the job was known.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.lock().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget `job_id` once it has finished.
    pub fn release(&self, job_id: &str) {
        self.lock().remove(job_id);
    }

    /// Number of jobs currently holding a token.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// JobDispatcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JobDispatcher {
    registry: Arc<dyn JobRegistry>,
    queue: mpsc::Sender<QueuedJob>,
    cancellations: JobCancellations,
}

impl JobDispatcher {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        queue: mpsc::Sender<QueuedJob>,
        cancellations: JobCancellations,
    ) -> Self {
        Self {
            registry,
            queue,
            cancellations,
        }
    }

    /// Register the job as processing and queue it.
    ///
    /// Returns as soon as the job is queued. A caller-supplied ID that is
    /// already registered is a `Conflict`; a full or closed queue is
    /// `Unavailable` and the registry entry is removed again.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, CoreError> {
        let job_id = match &request.requested_id {
            Some(id) => {
                validate_job_id(id)?;
                id.clone()
            }
            None => new_job_id(),
        };

        self.registry.create(&job_id, JobState::processing()).await?;
        self.cancellations.register(&job_id);

        let backend = request.process_method.clone();
        let model = request.model_name.clone();
        let queued = QueuedJob {
            job_id: job_id.clone(),
            request,
        };

        match self.queue.try_send(queued) {
            Ok(()) => {
                tracing::info!(job_id = %job_id, backend = %backend, model = %model, "Job queued");
                Ok(job_id)
            }
            Err(e) => {
                self.registry.delete(&job_id).await;
                self.cancellations.release(&job_id);
                let reason = match e {
                    TrySendError::Full(_) => "Job queue is full",
                    TrySendError::Closed(_) => "Job queue is closed",
                };
                tracing::warn!(job_id = %job_id, reason, "Job rejected");
                Err(CoreError::Unavailable(reason.to_string()))
            }
        }
    }

    /// Cancel a queued or running job. Returns whether it was still active.
    pub fn cancel(&self, job_id: &str) -> bool {
        let active = self.cancellations.cancel(job_id);
        if active {
            tracing::info!(job_id, "Job cancellation requested");
        }
        active
    }

    /// Jobs admitted and not yet finished.
    pub fn tracked_jobs(&self) -> usize {
        self.cancellations.len()
    }

    /// Free slots in the dispatch queue.
    pub fn queued_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        &self.registry
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

pub struct WorkerPool {
    worker: SeparationWorker,
    cancellations: JobCancellations,
    max_concurrent_jobs: usize,
    job_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        worker: SeparationWorker,
        cancellations: JobCancellations,
        max_concurrent_jobs: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            worker,
            cancellations,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
            job_timeout,
        }
    }

    /// Drain `queue` until `shutdown` fires or every sender is dropped.
    ///
    /// On shutdown, running jobs are cancelled through their tokens and
    /// awaited; jobs still queued are marked failed.
    pub async fn run(self, mut queue: mpsc::Receiver<QueuedJob>, shutdown: CancellationToken) {
        let limiter = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let tracker = TaskTracker::new();
        tracing::info!(
            max_concurrent_jobs = self.max_concurrent_jobs,
            job_timeout_secs = self.job_timeout.as_secs(),
            "Worker pool started",
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&limiter).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                _ = shutdown.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let worker = self.worker.clone();
            let cancellations = self.cancellations.clone();
            let cancel = cancellations.token(&job.job_id);
            let limit = self.job_timeout;
            tracker.spawn(async move {
                let _permit = permit;
                let job_id = job.job_id.clone();
                let _ = worker.run_supervised(job, limit, cancel).await;
                cancellations.release(&job_id);
            });
        }

        queue.close();
        while let Ok(job) = queue.try_recv() {
            self.worker
                .finish(&job.job_id, &Err(WorkerError::Cancelled))
                .await;
            self.cancellations.release(&job.job_id);
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("Worker pool stopped");
    }
}
