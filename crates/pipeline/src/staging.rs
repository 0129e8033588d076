//! Job-scoped work areas.
//!
//! Every job owns exactly one directory, `<root>/<job_id>`, holding the
//! staged input and everything the separator writes. Job IDs are validated
//! before they are joined onto the root, so a work area can never resolve
//! outside it or onto a sibling job.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use mixbuster_core::naming::{sanitize_filename, validate_job_id};
use mixbuster_core::request::InputSource;

use crate::retry::RetryPolicy;

/// Some input hosts reject requests without a browser User-Agent.
const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Invalid job ID '{0}'")]
    InvalidJobId(String),

    #[error("Invalid input filename '{0}'")]
    InvalidFilename(String),

    #[error("Failed to fetch input from {source_locator}: {message}")]
    SourceUnreachable {
        source_locator: String,
        message: String,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    fn write(path: &Path, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.display().to_string(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// StagingManager
// ---------------------------------------------------------------------------

pub struct StagingManager {
    root: PathBuf,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl StagingManager {
    pub fn new(root: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(DOWNLOAD_USER_AGENT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            root: root.into(),
            client,
            retry,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by `job_id`. Does not create it.
    pub fn work_area(&self, job_id: &str) -> Result<PathBuf, StagingError> {
        validate_job_id(job_id).map_err(|_| StagingError::InvalidJobId(job_id.to_string()))?;
        Ok(self.root.join(job_id))
    }

    /// Path of a file inside a job's work area, if the name is safe.
    pub fn file_in_work_area(&self, job_id: &str, filename: &str) -> Result<PathBuf, StagingError> {
        let area = self.work_area(job_id)?;
        let name = sanitize_filename(filename)
            .filter(|name| name == filename)
            .ok_or_else(|| StagingError::InvalidFilename(filename.to_string()))?;
        Ok(area.join(name))
    }

    /// Create the work area (idempotently) and materialize the input in it
    /// as `filename`. Returns the staged input path.
    pub async fn stage(
        &self,
        job_id: &str,
        source: &InputSource,
        filename: &str,
    ) -> Result<PathBuf, StagingError> {
        let area = self.work_area(job_id)?;
        tokio::fs::create_dir_all(&area)
            .await
            .map_err(|e| StagingError::write(&area, e))?;
        let target = self.file_in_work_area(job_id, filename)?;

        let bytes = match source {
            InputSource::Url(url) => {
                self.retry
                    .run_when(
                        "input download",
                        || self.download(url, &target),
                        |e| matches!(e, StagingError::SourceUnreachable { .. }),
                    )
                    .await?
            }
            InputSource::Uploaded(path) => move_into(path, &target).await?,
        };

        tracing::info!(job_id, path = %target.display(), bytes, "Input staged");
        Ok(target)
    }

    /// Remove a job's work area. Missing directories are not an error.
    pub async fn cleanup(&self, job_id: &str) -> Result<(), StagingError> {
        let area = self.work_area(job_id)?;
        match tokio::fs::remove_dir_all(&area).await {
            Ok(()) => {
                tracing::info!(job_id, "Work area removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StagingError::write(&area, e)),
        }
    }

    /// Stream `url` into `target`.
    async fn download(&self, url: &str, target: &Path) -> Result<u64, StagingError> {
        let unreachable = |message: String| StagingError::SourceUnreachable {
            source_locator: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unreachable(e.to_string()))?;

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| StagingError::write(target, e))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| unreachable(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| StagingError::write(target, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| StagingError::write(target, e))?;

        tracing::debug!(url, bytes = written, "Input downloaded");
        Ok(written)
    }
}

/// Move an uploaded file into the work area, copying across filesystems.
async fn move_into(source: &Path, target: &Path) -> Result<u64, StagingError> {
    if source == target {
        return Ok(0);
    }
    if tokio::fs::rename(source, target).await.is_ok() {
        return Ok(0);
    }
    let copied = tokio::fs::copy(source, target).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StagingError::SourceUnreachable {
                source_locator: source.display().to_string(),
                message: e.to_string(),
            }
        } else {
            StagingError::write(target, e)
        }
    })?;
    if let Err(e) = tokio::fs::remove_file(source).await {
        tracing::warn!(path = %source.display(), error = %e, "Failed to remove uploaded file");
    }
    Ok(copied)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
