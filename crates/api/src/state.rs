use std::path::PathBuf;
use std::sync::Arc;

use mixbuster_core::registry::JobRegistry;
use mixbuster_pipeline::inventory::ModelInventory;
use mixbuster_pipeline::StagingManager;
use mixbuster_worker::{JobDispatcher, SeparationWorker};

use crate::config::ServerConfig;

/// Directory under the work root that holds uploads not yet staged.
///
/// Job IDs cannot contain `.`, so it never collides with a work area.
pub const UPLOADS_DIR: &str = ".uploads";

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Job states, shared with the workers.
    pub registry: Arc<dyn JobRegistry>,
    /// Job admission into the worker pool.
    pub dispatcher: JobDispatcher,
    /// Work areas (downloads and cleanup).
    pub staging: Arc<StagingManager>,
    pub inventory: Arc<ModelInventory>,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        worker: &SeparationWorker,
        dispatcher: JobDispatcher,
    ) -> Self {
        Self {
            config,
            registry: Arc::clone(worker.registry()),
            dispatcher,
            staging: Arc::clone(worker.staging()),
            inventory: Arc::new(ModelInventory::new(worker.resolver().models_dir())),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.staging.root().join(UPLOADS_DIR)
    }
}
