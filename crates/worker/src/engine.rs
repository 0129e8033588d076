//! Wiring: build the worker from configuration and start the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mixbuster_cloud::{DirectoryObjectStore, ObjectStore, S3ObjectStore};
use mixbuster_core::catalog::ModelCatalog;
use mixbuster_core::registry::JobRegistry;
use mixbuster_pipeline::retry::RetryPolicy;
use mixbuster_pipeline::{ParameterResolver, ResultDelivery, StagingManager, SubprocessSeparator};

use crate::config::{EngineConfig, StorageConfig};
use crate::pool::{JobCancellations, JobDispatcher, QueuedJob, WorkerPool};
use crate::worker::SeparationWorker;

/// Pool sizing, split out so tests can start an engine around any worker.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
}

impl From<&EngineConfig> for PoolSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs,
            queue_capacity: config.queue_capacity,
            job_timeout: config.job_timeout,
        }
    }
}

/// Build the object store selected by `storage`.
pub async fn build_store(storage: &StorageConfig) -> Arc<dyn ObjectStore> {
    match storage {
        StorageConfig::S3(r2) => Arc::new(S3ObjectStore::connect(r2).await),
        StorageConfig::Local {
            dir,
            public_base_url,
        } => Arc::new(DirectoryObjectStore::new(dir, public_base_url.as_str())),
    }
}

/// Build a worker backed by the subprocess separator.
pub async fn build_worker(
    config: &EngineConfig,
    registry: Arc<dyn JobRegistry>,
) -> SeparationWorker {
    let catalog = tokio::task::spawn_blocking({
        let path = config.catalog_path.clone();
        move || ModelCatalog::load_or_empty(&path)
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Catalog loading task failed");
        ModelCatalog::empty()
    });

    let retry = RetryPolicy::new(config.network_retry_attempts);
    let store = build_store(&config.storage).await;
    tracing::info!(
        store = store.name(),
        models_dir = %config.models_dir.display(),
        work_dir = %config.work_dir.display(),
        catalog_entries = catalog.len(),
        "Processing engine configured"
    );

    let separator = SubprocessSeparator::new(
        config.separator_program.as_str(),
        config.separator_args.clone(),
    )
    .with_timeout(config.job_timeout);

    SeparationWorker::new(
        registry,
        Arc::new(ParameterResolver::new(&config.models_dir, Arc::new(catalog))),
        Arc::new(StagingManager::new(&config.work_dir, retry)),
        Arc::new(separator),
        Arc::new(ResultDelivery::new(store, retry)),
    )
    .with_cleanup_after_delivery(config.cleanup_after_delivery)
}

/// A running worker pool and its submission handle.
pub struct Engine {
    pub worker: SeparationWorker,
    pub dispatcher: JobDispatcher,
    shutdown: CancellationToken,
    pool: JoinHandle<()>,
}

impl Engine {
    pub async fn start(config: &EngineConfig, registry: Arc<dyn JobRegistry>) -> Self {
        let worker = build_worker(config, registry).await;
        Self::launch(worker, PoolSettings::from(config))
    }

    /// Start a pool around an already built worker.
    pub fn launch(worker: SeparationWorker, settings: PoolSettings) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedJob>(settings.queue_capacity.max(1));
        let shutdown = CancellationToken::new();
        let cancellations = JobCancellations::new(shutdown.clone());
        let dispatcher =
            JobDispatcher::new(Arc::clone(worker.registry()), tx, cancellations.clone());
        let pool = WorkerPool::new(
            worker.clone(),
            cancellations,
            settings.max_concurrent_jobs,
            settings.job_timeout,
        );
        let pool = tokio::spawn(pool.run(rx, shutdown.clone()));

        Self {
            worker,
            dispatcher,
            shutdown,
            pool,
        }
    }

    /// Cancel running jobs and wait for the pool to stop.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.pool.await {
            tracing::error!(error = %e, "Worker pool task failed");
        }
    }
}
