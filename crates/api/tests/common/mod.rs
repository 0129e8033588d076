#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Path as UrlPath;
use axum::http::{Method, Request, Response};
use axum::routing::get as route_get;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use mixbuster_api::config::ServerConfig;
use mixbuster_api::router::build_app_router;
use mixbuster_api::state::AppState;
use mixbuster_cloud::DirectoryObjectStore;
use mixbuster_core::catalog::ModelCatalog;
use mixbuster_core::job::JobState;
use mixbuster_core::registry::{InMemoryJobRegistry, JobRegistry};
use mixbuster_pipeline::retry::RetryPolicy;
use mixbuster_pipeline::{
    BackendConfiguration, ParameterResolver, ProgressSink, ResultDelivery, SeparationBackend,
    SeparationError, StagingManager,
};
use mixbuster_worker::{Engine, PoolSettings, SeparationWorker};

pub const MODEL: &str = "UVR-MDX-NET-Inst_HQ_3";
pub const STORE_BASE_URL: &str = "https://files.example.com";
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        upload_timeout_secs: 300,
        shutdown_timeout_secs: 5,
        max_upload_bytes: MAX_UPLOAD_BYTES,
        job_retention_secs: 3600,
    }
}

// ---------------------------------------------------------------------------
// Fake separator
// ---------------------------------------------------------------------------

/// Writes `<input stem>_(<stem>).wav` files holding the input's bytes.
pub struct FakeSeparator {
    pub stems: Vec<&'static str>,
    pub delay: Duration,
    pub fail_with: Option<String>,
}

impl Default for FakeSeparator {
    fn default() -> Self {
        Self {
            stems: vec!["Vocals", "Instrumental"],
            delay: Duration::ZERO,
            fail_with: None,
        }
    }
}

#[async_trait]
impl SeparationBackend for FakeSeparator {
    async fn run(
        &self,
        _config: &BackendConfiguration,
        input: &Path,
        output_dir: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), SeparationError> {
        progress(0.5);
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
// Test application
// ---------------------------------------------------------------------------

/// A running engine plus the router in front of it.
pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub registry: Arc<dyn JobRegistry>,
    pub engine: Option<Engine>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_separator(FakeSeparator::default())
    }

    pub fn with_separator(separator: FakeSeparator) -> Self {
        Self::with_config(separator, test_config())
    }

    /// Temp tree with one installed MDX-Net model, served by `separator`.
    pub fn with_config(separator: FakeSeparator, config: ServerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mdx = dir.path().join("models/MDX_Net_Models");
        std::fs::create_dir_all(&mdx).unwrap();
        std::fs::write(mdx.join(format!("{MODEL}.onnx")), b"onnx-weights").unwrap();

        let registry: Arc<dyn JobRegistry> = Arc::new(InMemoryJobRegistry::new());
        let worker = SeparationWorker::new(
            Arc::clone(&registry),
            Arc::new(ParameterResolver::new(
                dir.path().join("models"),
                Arc::new(ModelCatalog::empty()),
            )),
            Arc::new(StagingManager::new(dir.path().join("work"), RetryPolicy::NONE)),
            Arc::new(separator),
            Arc::new(ResultDelivery::new(
                Arc::new(DirectoryObjectStore::new(
                    dir.path().join("store"),
                    STORE_BASE_URL,
                )),
                RetryPolicy::NONE,
            )),
        );
        let engine = Engine::launch(
            worker,
            PoolSettings {
                max_concurrent_jobs: 2,
                queue_capacity: 8,
                job_timeout: Duration::from_secs(10),
            },
        );

        let state = AppState::new(
            Arc::new(config.clone()),
            &engine.worker,
            engine.dispatcher.clone(),
        );
        let router = build_app_router(state, &config);

        Self {
            dir,
            registry,
            engine: Some(engine),
            router,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir().join(".uploads")
    }

    /// Stop the worker pool; later submissions are rejected.
    pub async fn stop_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
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

    /// Wait until the engine holds no queued or running job.
    pub async fn wait_until_idle(&self) {
        let Some(engine) = &self.engine else { return };
        for _ in 0..500 {
            if engine.dispatcher.tracked_jobs() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("jobs still running: {}", engine.dispatcher.tracked_jobs());
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

// ---------------------------------------------------------------------------
// Loopback source server
// ---------------------------------------------------------------------------

/// Serves `GET /audio/{name}` with body `audio:{name}`. Returns the base URL.
pub async fn spawn_source() -> String {
    let app = Router::new().route(
        "/audio/{name}",
        route_get(|UrlPath(name): UrlPath<String>| async move { format!("audio:{name}") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Collect a response body into a `serde_json::Value`.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "mixbuster-test-boundary";

/// Multipart form body builder.
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

pub async fn post_multipart(app: Router, uri: &str, form: Form) -> Response<Body> {
    let body = form.finish();
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("content-length", body.len().to_string())
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST `body` in two halves with `pause` in between.
pub async fn post_slowly(
    app: Router,
    uri: &str,
    content_type: &str,
    body: Vec<u8>,
    pause: Duration,
) -> Response<Body> {
    let length = body.len();
    let (mut writer, reader) = tokio::io::duplex(length.max(1));
    tokio::spawn(async move {
        let (head, tail) = body.split_at(length / 2);
        if writer.write_all(head).await.is_err() {
            return;
        }
        tokio::time::sleep(pause).await;
        let _ = writer.write_all(tail).await;
    });
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", content_type)
        .header("content-length", length.to_string())
        .body(Body::from_stream(ReaderStream::new(reader)))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// A complete upload form for `MODEL`.
pub fn upload_form(filename: &str, content: &[u8]) -> Form {
    Form::new()
        .file("audio_file", filename, content)
        .text("model_name", MODEL)
        .text("process_method", "MDX-Net")
}
