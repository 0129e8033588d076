//! Single-shot handler: run one job event to a terminal state.
//!
//! Reads the event from the file named by the first argument, or from
//! stdin, and prints one JSON line with the outcome. Logs go to stderr.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use mixbuster_core::job::JobState;
use mixbuster_core::naming::new_job_id;
use mixbuster_core::registry::{InMemoryJobRegistry, JobRegistry};
use mixbuster_worker::engine::build_worker;
use mixbuster_worker::handler::{HandlerEvent, HandlerOutput};
use mixbuster_worker::telemetry::init_tracing;
use mixbuster_worker::{EngineConfig, QueuedJob};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing(
        "mixbuster_worker=debug,mixbuster_pipeline=debug,mixbuster_cloud=info",
        std::io::stderr,
    );

    let output = match run().await {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(error = ?e, "Handler failed");
            HandlerOutput::failure(format!("{e:#}"))
        }
    };

    match serde_json::to_string(&output) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "Failed to encode handler output"),
    }

    if output.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run() -> anyhow::Result<HandlerOutput> {
    let raw = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read job event from {path}"))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read job event from stdin")?;
            raw
        }
    };

    let event: HandlerEvent = serde_json::from_str(&raw).context("Invalid job event")?;
    let request = match event.input.into_request() {
        Ok(request) => request,
        Err(e) => return Ok(HandlerOutput::failure(e)),
    };

    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    let registry: Arc<dyn JobRegistry> = Arc::new(InMemoryJobRegistry::new());
    let worker = build_worker(&config, Arc::clone(&registry)).await;

    let job_id = request.requested_id.clone().unwrap_or_else(new_job_id);
    registry.create(&job_id, JobState::processing()).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; cancelling job");
                cancel.cancel();
            }
        }
    });

    let job = QueuedJob {
        job_id: job_id.clone(),
        request,
    };
    let output = match worker.run_supervised(job, config.job_timeout, cancel).await {
        Ok(_) => HandlerOutput::success(job_id),
        Err(e) => HandlerOutput::failure(e),
    };
    Ok(output)
}
