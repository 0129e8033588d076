//! The per-job unit of execution.
//!
//! A [`SeparationWorker`] runs one job through its stages in order:
//! stage input, resolve configuration, separate, enumerate outputs,
//! deliver. It reports only through the [`JobRegistry`]; the supervised
//! entry point turns every failure (including panics and timeouts) into
//! the job's terminal `Error` state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mixbuster_core::job::{progress_from_fraction, JobUpdate};
use mixbuster_core::registry::JobRegistry;
use mixbuster_core::request::ResultDestination;
use mixbuster_pipeline::packaging::list_outputs;
use mixbuster_pipeline::{
    DeliveryError, DeliveryReceipt, ParameterResolver, ProgressSink, ResultDelivery,
    SeparationBackend, SeparationError, StagingManager,
};

use crate::error::WorkerError;
use crate::pool::QueuedJob;

/// Progress after the input is staged.
pub const STAGED_PROGRESS: u8 = 5;
/// Progress after the configuration is resolved.
pub const RESOLVED_PROGRESS: u8 = 10;
/// Progress once the separator has finished.
pub const SEPARATED_PROGRESS: u8 = 90;

/// Scale a separator fraction into the window between resolution and
/// delivery.
pub fn separation_progress(fraction: f64) -> u8 {
    let window = f64::from(SEPARATED_PROGRESS - RESOLVED_PROGRESS) / 100.0;
    let start = f64::from(RESOLVED_PROGRESS) / 100.0;
    progress_from_fraction(start + window * fraction.clamp(0.0, 1.0))
}

#[derive(Clone)]
pub struct SeparationWorker {
    registry: Arc<dyn JobRegistry>,
    resolver: Arc<ParameterResolver>,
    staging: Arc<StagingManager>,
    separator: Arc<dyn SeparationBackend>,
    delivery: Arc<ResultDelivery>,
    cleanup_after_delivery: bool,
}

impl SeparationWorker {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        resolver: Arc<ParameterResolver>,
        staging: Arc<StagingManager>,
        separator: Arc<dyn SeparationBackend>,
        delivery: Arc<ResultDelivery>,
    ) -> Self {
        Self {
            registry,
            resolver,
            staging,
            separator,
            delivery,
            cleanup_after_delivery: false,
        }
    }

    /// Remove the work area once a remote delivery succeeds.
    pub fn with_cleanup_after_delivery(mut self, enabled: bool) -> Self {
        self.cleanup_after_delivery = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        &self.registry
    }

    pub fn staging(&self) -> &Arc<StagingManager> {
        &self.staging
    }

    pub fn resolver(&self) -> &Arc<ParameterResolver> {
        &self.resolver
    }

    pub fn store_name(&self) -> &'static str {
        self.delivery.store_name()
    }

    /// Run `job` under a wall-clock `limit` and record its terminal state.
    ///
    /// The job runs on its own task so a panic inside any stage is caught
    /// here. On timeout `cancel` is fired and the task aborted.
    pub async fn run_supervised(
        &self,
        job: QueuedJob,
        limit: Duration,
        cancel: CancellationToken,
    ) -> Result<DeliveryReceipt, WorkerError> {
        let job_id = job.job_id.clone();
        let worker = self.clone();
        let token = cancel.clone();
        let mut handle = tokio::spawn(async move { worker.execute(job, token).await });

        let result = match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(WorkerError::Panicked(message))
            }
            Ok(Err(join_err)) => Err(WorkerError::Internal(join_err.to_string())),
            Err(_) => {
                cancel.cancel();
                handle.abort();
                Err(WorkerError::TimedOut(limit))
            }
        };

        self.finish(&job_id, &result).await;
        result
    }

    /// Run every stage of `job`. Does not record the terminal state.
    pub async fn execute(
        &self,
        job: QueuedJob,
        cancel: CancellationToken,
    ) -> Result<DeliveryReceipt, WorkerError> {
        let QueuedJob { job_id, request } = job;
        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        tracing::info!(
            job_id = %job_id,
            backend = %request.process_method,
            model = %request.model_name,
            "Job started"
        );

        tracing::debug!(job_id = %job_id, stage = "staging", "Stage started");
        let input = self
            .staging
            .stage(&job_id, &request.source, &request.original_filename)
            .await?;
        self.checkpoint(&job_id, STAGED_PROGRESS, &cancel).await?;

        tracing::debug!(job_id = %job_id, stage = "resolution", "Stage started");
        let config = {
            let resolver = Arc::clone(&self.resolver);
            let process_method = request.process_method.clone();
            let model_name = request.model_name.clone();
            let overrides = request.overrides.clone();
            tokio::task::spawn_blocking(move || {
                resolver.resolve(&process_method, &model_name, &overrides)
            })
            .await
            .map_err(|e| WorkerError::Internal(e.to_string()))??
        };
        tracing::info!(
            job_id = %job_id,
            separator = ?config.kind,
            fingerprint = %config.fingerprint,
            stems = config.topology.count(),
            "Configuration resolved"
        );
        self.checkpoint(&job_id, RESOLVED_PROGRESS, &cancel).await?;

        tracing::debug!(job_id = %job_id, stage = "separation", "Stage started");
        let work_area = self.staging.work_area(&job_id)?;
        self.separator
            .run(
                &config,
                &input,
                &work_area,
                self.progress_sink(&job_id),
                cancel.clone(),
            )
            .await?;

        let outputs = list_outputs(&work_area, &[request.original_filename.as_str()])
            .map_err(|e| WorkerError::Delivery(DeliveryError::Packaging(e)))?;
        if outputs.is_empty() {
            return Err(SeparationError::NoOutput.into());
        }
        tracing::info!(job_id = %job_id, outputs = outputs.len(), "Separation finished");
        self.checkpoint(&job_id, SEPARATED_PROGRESS, &cancel).await?;

        tracing::debug!(job_id = %job_id, stage = "delivery", "Stage started");
        let receipt = self
            .delivery
            .deliver(
                &work_area,
                &job_id,
                &request.original_filename,
                &request.destination,
            )
            .await?;

        if self.cleanup_after_delivery
            && matches!(request.destination, ResultDestination::Remote { .. })
        {
            if let Err(e) = self.staging.cleanup(&job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Work area cleanup failed");
            }
        }

        Ok(receipt)
    }

    /// Record the terminal state for `result`.
    pub async fn finish(&self, job_id: &str, result: &Result<DeliveryReceipt, WorkerError>) {
        let update = match result {
            Ok(receipt) => {
                tracing::info!(
                    job_id,
                    files = receipt.files.len(),
                    result_url = receipt.result_url.as_deref().unwrap_or(""),
                    callback = receipt.callback_delivered,
                    "Job complete"
                );
                JobUpdate::Complete {
                    files: receipt.files.clone(),
                    result_url: receipt.result_url.clone(),
                }
            }
            Err(e) => {
                tracing::error!(
                    job_id,
                    stage = e.stage(),
                    error = ?e,
                    "Job failed: {e}"
                );
                JobUpdate::Fail(e.to_string())
            }
        };

        if self.registry.update(job_id, update).await {
            return;
        }
        if self.registry.get(job_id).await.is_some() {
            tracing::warn!(job_id, "Terminal state not recorded; job already final");
            return;
        }
        tracing::info!(job_id, "Job was removed while running; discarding its work area");
        if let Err(e) = self.staging.cleanup(job_id).await {
            tracing::warn!(job_id, error = %e, "Work area cleanup failed");
        }
    }

    async fn checkpoint(
        &self,
        job_id: &str,
        percent: u8,
        cancel: &CancellationToken,
    ) -> Result<(), WorkerError> {
        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        let recorded = self
            .registry
            .update(job_id, JobUpdate::Progress(percent))
            .await;
        if !recorded && self.registry.get(job_id).await.is_none() {
            tracing::info!(job_id, percent, "Job no longer registered; stopping");
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    /// A sink that forwards separator progress to the registry in order.
    ///
    /// Only increases are forwarded; the forwarding task ends when the
    /// last clone of the sink is dropped.
    fn progress_sink(&self, job_id: &str) -> ProgressSink {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let registry = Arc::clone(&self.registry);
        let owner = job_id.to_string();
        tokio::spawn(async move {
            while let Some(percent) = rx.recv().await {
                registry.update(&owner, JobUpdate::Progress(percent)).await;
            }
        });

        let last = AtomicU8::new(RESOLVED_PROGRESS);
        Arc::new(move |fraction: f64| {
            let percent = separation_progress(fraction);
            if last.fetch_max(percent, Ordering::Relaxed) < percent {
                let _ = tx.send(percent);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separation_progress_spans_the_middle_window() {
        assert_eq!(separation_progress(0.0), 10);
        assert_eq!(separation_progress(0.5), 50);
        assert_eq!(separation_progress(1.0), 90);
    }

    #[test]
    fn separation_progress_clamps() {
        assert_eq!(separation_progress(-3.0), 10);
        assert_eq!(separation_progress(7.0), 90);
        assert_eq!(separation_progress(f64::NAN), 0);
    }
}
