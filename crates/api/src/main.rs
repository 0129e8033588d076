use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mixbuster_api::background::job_retention;
use mixbuster_api::config::ServerConfig;
use mixbuster_api::router::build_app_router;
use mixbuster_api::state::AppState;
use mixbuster_core::registry::{InMemoryJobRegistry, JobRegistry};
use mixbuster_worker::telemetry::init_tracing;
use mixbuster_worker::{Engine, EngineConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing(
        "mixbuster_api=debug,mixbuster_worker=debug,mixbuster_pipeline=debug,tower_http=debug",
        std::io::stdout,
    );

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let engine_config = EngineConfig::from_env().expect("Invalid engine configuration");
    tracing::info!(
        models_dir = %engine_config.models_dir.display(),
        work_dir = %engine_config.work_dir.display(),
        max_concurrent_jobs = engine_config.max_concurrent_jobs,
        "Loaded engine configuration"
    );

    // --- Engine ---
    let registry: Arc<dyn JobRegistry> = Arc::new(InMemoryJobRegistry::new());
    let engine = Engine::start(&engine_config, registry).await;
    tracing::info!(store = engine.worker.store_name(), "Worker pool started");

    // --- App state ---
    let state = AppState::new(
        Arc::new(config.clone()),
        &engine.worker,
        engine.dispatcher.clone(),
    );

    // Spawn job retention (removes finished jobs past the retention period).
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(job_retention::run(
        Arc::clone(&state.registry),
        Arc::clone(&state.staging),
        Duration::from_secs(config.job_retention_secs),
        retention_cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Job retention stopped");

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, engine.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Worker pool did not stop in time"
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
