//! Periodic removal of finished jobs.
//!
//! Terminal jobs whose last update is older than the retention period lose
//! their registry entry and their work area. Runs on a fixed interval using
//! `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mixbuster_core::registry::JobRegistry;
use mixbuster_pipeline::StagingManager;

/// How often the sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Remove every terminal job last updated before `now - retention`.
/// Returns how many jobs were removed.
pub async fn sweep(
    registry: &dyn JobRegistry,
    staging: &StagingManager,
    retention: Duration,
) -> usize {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(retention)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let mut removed = 0;
    for job_id in registry.expired(cutoff).await {
        if registry.delete(&job_id).await {
            removed += 1;
        }
        if let Err(e) = staging.cleanup(&job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "Job retention: work area cleanup failed");
        }
    }
    removed
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    registry: Arc<dyn JobRegistry>,
    staging: Arc<StagingManager>,
    retention: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Job retention task started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = sweep(registry.as_ref(), &staging, retention).await;
                if removed > 0 {
                    tracing::info!(removed, "Job retention: removed expired jobs");
                } else {
                    tracing::debug!("Job retention: nothing to remove");
                }
            }
        }
    }
}
