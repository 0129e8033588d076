//! Result delivery: package, publish, notify.

use std::path::Path;
use std::sync::Arc;

use mixbuster_cloud::{ObjectStore, StorageError};
use mixbuster_core::request::ResultDestination;
use mixbuster_events::{CallbackClient, CallbackError, CompletionNotice};

use crate::packaging::{list_outputs, package_outputs, PackagedArchive, PackagingError};
use crate::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("Completion callback failed: {0}")]
    Callback(#[from] CallbackError),

    #[error("Delivery task failed: {0}")]
    Internal(String),
}

/// What was delivered for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Output filenames in the work area, sorted.
    pub files: Vec<String>,
    /// Present for remote destinations.
    pub archive: Option<PackagedArchive>,
    pub result_url: Option<String>,
    pub callback_delivered: bool,
}

pub struct ResultDelivery {
    store: Arc<dyn ObjectStore>,
    callback: CallbackClient,
    upload_retry: RetryPolicy,
}

impl ResultDelivery {
    pub fn new(store: Arc<dyn ObjectStore>, upload_retry: RetryPolicy) -> Self {
        Self {
            store,
            callback: CallbackClient::new(),
            upload_retry,
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Deliver the outputs in `work_area` to `destination`.
    ///
    /// Local destinations only enumerate the files. Remote destinations
    /// archive them, upload the archive (retried per policy) and POST the
    /// completion callback once; a failed callback fails the delivery even
    /// though the archive is already published.
    pub async fn deliver(
        &self,
        work_area: &Path,
        job_id: &str,
        original_filename: &str,
        destination: &ResultDestination,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let callback_url = match destination {
            ResultDestination::Local => {
                let files = list_outputs(work_area, &[original_filename])?;
                return Ok(DeliveryReceipt {
                    files,
                    archive: None,
                    result_url: None,
                    callback_delivered: false,
                });
            }
            ResultDestination::Remote { callback_url } => callback_url.as_deref(),
        };

        let archive = {
            let dir = work_area.to_path_buf();
            let job_id = job_id.to_string();
            let input = original_filename.to_string();
            tokio::task::spawn_blocking(move || package_outputs(&dir, &job_id, &input))
                .await
                .map_err(|e| DeliveryError::Internal(e.to_string()))??
        };

        let key = archive
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DeliveryError::Internal("archive path has no file name".into()))?;
        let url = self
            .upload_retry
            .run("archive upload", || self.store.put(&key, &archive.path))
            .await?;
        tracing::info!(
            job_id,
            store = self.store.name(),
            url = %url,
            sha256 = %archive.sha256,
            "Archive published"
        );

        let mut callback_delivered = false;
        if let Some(callback_url) = callback_url {
            let notice = CompletionNotice {
                job_id: job_id.to_string(),
                download_url: url.clone(),
                original_filename: original_filename.to_string(),
            };
            self.callback.notify(callback_url, &notice).await?;
            callback_delivered = true;
        }

        Ok(DeliveryReceipt {
            files: archive.files.clone(),
            archive: Some(archive),
            result_url: Some(url),
            callback_delivered,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Router};
    use mixbuster_cloud::DirectoryObjectStore;

    use super::*;

    type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn spawn_callback(status: StatusCode) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let recorder = Arc::clone(&seen);
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
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/finish"), seen)
    }

    fn work_area() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"in").unwrap();
        std::fs::write(dir.path().join("song_(Vocals).wav"), b"v").unwrap();
        std::fs::write(dir.path().join("song_(Instrumental).wav"), b"i").unwrap();
        dir
    }

    fn delivery(store_root: &Path) -> ResultDelivery {
        ResultDelivery::new(
            Arc::new(DirectoryObjectStore::new(store_root, "https://files.example.com")),
            RetryPolicy::NONE,
        )
    }

    #[tokio::test]
    async fn local_destination_lists_files_only() {
        let area = work_area();
        let store = tempfile::tempdir().unwrap();
        let receipt = delivery(store.path())
            .deliver(area.path(), "j1", "song.mp3", &ResultDestination::Local)
            .await
            .unwrap();
        assert_eq!(receipt.files, vec!["song_(Instrumental).wav", "song_(Vocals).wav"]);
        assert!(receipt.result_url.is_none());
        assert!(!area.path().join("j1-mixbusted.zip").exists());
    }

    #[tokio::test]
    async fn remote_destination_uploads_and_calls_back() {
        let (callback_url, seen) = spawn_callback(StatusCode::OK).await;
        let area = work_area();
        let store = tempfile::tempdir().unwrap();

        let receipt = delivery(store.path())
            .deliver(
                area.path(),
                "j1",
                "song.mp3",
                &ResultDestination::Remote {
                    callback_url: Some(callback_url),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            receipt.result_url.as_deref(),
            Some("https://files.example.com/j1-mixbusted.zip")
        );
        assert!(receipt.callback_delivered);
        assert!(store.path().join("j1-mixbusted.zip").exists());

        let calls = seen.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["jobId"], "j1");
        assert_eq!(calls[0]["downloadUrl"], "https://files.example.com/j1-mixbusted.zip");
        assert_eq!(calls[0]["originalFilename"], "song.mp3");
    }

    #[tokio::test]
    async fn callback_server_error_fails_delivery_once() {
        let (callback_url, seen) = spawn_callback(StatusCode::INTERNAL_SERVER_ERROR).await;
        let area = work_area();
        let store = tempfile::tempdir().unwrap();

        let err = delivery(store.path())
            .deliver(
                area.path(),
                "j1",
                "song.mp3",
                &ResultDestination::Remote {
                    callback_url: Some(callback_url),
                },
            )
            .await
            .unwrap_err();

        assert_matches!(err, DeliveryError::Callback(CallbackError::HttpStatus(500)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remote_without_callback_still_publishes() {
        let area = work_area();
        let store = tempfile::tempdir().unwrap();
        let receipt = delivery(store.path())
            .deliver(
                area.path(),
                "j2",
                "song.mp3",
                &ResultDestination::Remote { callback_url: None },
            )
            .await
            .unwrap();
        assert!(!receipt.callback_delivered);
        assert_eq!(receipt.archive.unwrap().files.len(), 2);
    }
}
