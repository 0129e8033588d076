#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Path as UrlPath;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Form, Router};
use tokio_util::sync::CancellationToken;

use mixbuster_cloud::DirectoryObjectStore;
use mixbuster_core::catalog::ModelCatalog;
use mixbuster_core::error::CoreError;
use mixbuster_core::job::{JobState, JobUpdate};
use mixbuster_core::registry::{InMemoryJobRegistry, JobRegistry};
use mixbuster_core::request::{JobRequest, ResultDestination, SubmitJob};
use mixbuster_core::types::{JobId, Timestamp};
use mixbuster_pipeline::retry::RetryPolicy;
use mixbuster_pipeline::{
    BackendConfiguration, ParameterResolver, ProgressSink, ResultDelivery, SeparationBackend,
    SeparationError, StagingManager,
};
use mixbuster_worker::{JobDispatcher, SeparationWorker};

pub const MODEL: &str = "UVR-MDX-NET-Inst_HQ_3";
pub const STORE_BASE_URL: &str = "https://files.example.com";

// ---------------------------------------------------------------------------
// Fake separator
// ---------------------------------------------------------------------------

/// Writes `<input stem>_(<stem>).wav` files holding the input's bytes.
pub struct FakeSeparator {
    pub stems: Vec<&'static str>,
    pub progress: Vec<f64>,
    pub delay: Duration,
    pub fail_with: Option<String>,
    pub panic_with: Option<&'static str>,
    /// The configuration of the last run.
    pub seen: Arc<Mutex<Option<BackendConfiguration>>>,
}

impl Default for FakeSeparator {
    fn default() -> Self {
        Self {
            stems: vec!["Vocals", "Instrumental"],
            progress: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            delay: Duration::ZERO,
            fail_with: None,
            panic_with: None,
            seen: Arc::default(),
        }
    }
}

#[async_trait]
impl SeparationBackend for FakeSeparator {
    async fn run(
        &self,
        config: &BackendConfiguration,
        input: &Path,
        output_dir: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), SeparationError> {
        *self.seen.lock().unwrap() = Some(config.clone());
        if let Some(message) = self.panic_with {
            panic!("{message}");
        }
        for fraction in &self.progress {
            progress(*fraction);
        }
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SeparationError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        if let Some(message) = &self.fail_with {
            return Err(SeparationError::Reported(message.clone()));
        }

        let body = std::fs::read(input).map_err(SeparationError::Spawn)?;
        let base = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        for stem in &self.stems {
            std::fs::write(output_dir.join(format!("{base}_({stem}).wav")), &body)
                .map_err(SeparationError::Spawn)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recording registry
// ---------------------------------------------------------------------------

/// In-memory registry that also records every accepted progress value.
#[derive(Default)]
pub struct RecordingRegistry {
    inner: InMemoryJobRegistry,
    progress: Mutex<HashMap<JobId, Vec<u8>>>,
}

impl RecordingRegistry {
    pub fn progress_of(&self, job_id: &str) -> Vec<u8> {
        self.progress
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobRegistry for RecordingRegistry {
    async fn create(&self, job_id: &str, state: JobState) -> Result<(), CoreError> {
        self.inner.create(job_id, state).await
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> bool {
        let percent = match &update {
            JobUpdate::Progress(p) => Some(*p),
            _ => None,
        };
        let accepted = self.inner.update(job_id, update).await;
        if let (true, Some(p)) = (accepted, percent) {
            self.progress
                .lock()
                .unwrap()
                .entry(job_id.to_string())
                .or_default()
                .push(p);
        }
        accepted
    }

    async fn get(&self, job_id: &str) -> Option<JobState> {
        self.inner.get(job_id).await
    }

    async fn delete(&self, job_id: &str) -> bool {
        self.inner.delete(job_id).await
    }

    async fn expired(&self, cutoff: Timestamp) -> Vec<JobId> {
        self.inner.expired(cutoff).await
    }

    async fn active_count(&self) -> usize {
        self.inner.active_count().await
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub registry: Arc<RecordingRegistry>,
}

impl TestEnv {
    /// Temp tree with one installed MDX-Net model and an empty catalog.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mdx = dir.path().join("models/MDX_Net_Models");
        std::fs::create_dir_all(&mdx).unwrap();
        std::fs::write(mdx.join(format!("{MODEL}.onnx")), b"onnx-weights").unwrap();
        Self {
            dir,
            registry: Arc::default(),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.dir.path().join("models")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn registry(&self) -> Arc<dyn JobRegistry> {
        self.registry.clone()
    }

    /// Path of the installed `MODEL` artifact.
    pub fn model_path(&self) -> PathBuf {
        self.models_dir()
            .join("MDX_Net_Models")
            .join(format!("{MODEL}.onnx"))
    }

    pub fn worker(&self, separator: FakeSeparator) -> SeparationWorker {
        self.worker_with_catalog(separator, ModelCatalog::empty())
    }

    pub fn worker_with_catalog(
        &self,
        separator: FakeSeparator,
        catalog: ModelCatalog,
    ) -> SeparationWorker {
        SeparationWorker::new(
            self.registry(),
            Arc::new(ParameterResolver::new(self.models_dir(), Arc::new(catalog))),
            Arc::new(StagingManager::new(self.work_dir(), RetryPolicy::NONE)),
            Arc::new(separator),
            Arc::new(ResultDelivery::new(
                Arc::new(DirectoryObjectStore::new(self.store_dir(), STORE_BASE_URL)),
                RetryPolicy::NONE,
            )),
        )
    }

    /// Poll the registry until the job reports at least `percent`.
    pub async fn wait_for_progress(&self, job_id: &str, percent: u8) {
        for _ in 0..500 {
            if let Some(state) = self.registry.get(job_id).await {
                if state.progress >= percent {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached {percent}%");
    }

    /// Poll the registry until the job reaches a terminal status.
    pub async fn wait_for_terminal(&self, job_id: &str) -> JobState {
        for _ in 0..500 {
            if let Some(state) = self.registry.get(job_id).await {
                if state.status.is_terminal() {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} did not finish in time");
    }
}

/// A validated request for `MODEL` with the given source and destination.
pub fn request(
    job_id: Option<&str>,
    input_url: &str,
    destination: ResultDestination,
) -> JobRequest {
    request_for_model(job_id, input_url, MODEL, destination)
}

pub fn request_for_model(
    job_id: Option<&str>,
    input_url: &str,
    model_name: &str,
    destination: ResultDestination,
) -> JobRequest {
    SubmitJob {
        job_id: job_id.map(str::to_string),
        input_url: Some(input_url.to_string()),
        original_filename: None,
        process_method: Some("MDX-Net".into()),
        model_name: Some(model_name.into()),
        destination: Some(destination),
        overrides: Default::default(),
    }
    .validate()
    .unwrap()
}

// ---------------------------------------------------------------------------
// Loopback servers
// ---------------------------------------------------------------------------

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Serves `GET /audio/{name}` with body `audio:{name}`. Returns the base URL.
pub async fn spawn_source() -> String {
    let app = Router::new().route(
        "/audio/{name}",
        get(|UrlPath(name): UrlPath<String>| async move { format!("audio:{name}") }),
    );
    serve(app).await
}

pub type CallbackLog = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Completion endpoint answering `status`. Returns its URL and the log of
/// received forms.
pub async fn spawn_callback(status: StatusCode) -> (String, CallbackLog) {
    let log: CallbackLog = Arc::default();
    let recorder = Arc::clone(&log);
    let app = Router::new().route(
        "/finish",
        post(move |Form(fields): Form<HashMap<String, String>>| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(fields);
                status
            }
        }),
    );
    let base = serve(app).await;
    (format!("{base}/finish"), log)
}

/// Wait until no admitted job is still queued or running.
pub async fn wait_until_idle(dispatcher: &JobDispatcher) {
    for _ in 0..500 {
        if dispatcher.tracked_jobs() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("jobs still running: {}", dispatcher.tracked_jobs());
}
