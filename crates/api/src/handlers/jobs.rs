//! Handlers for the `/jobs` resource.
//!
//! Submission only registers and queues the job; status is polled through
//! [`get_job`]. The root-level compatibility handlers reuse the helpers
//! here.

use std::path::{Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use mixbuster_core::error::CoreError;
use mixbuster_core::job::JobState;
use mixbuster_core::naming::{new_job_id, sanitize_filename, validate_job_id};
use mixbuster_core::params::ParamLayer;
use mixbuster_core::request::{
    require_field, validate_http_url, InputSource, JobRequest, ResultDestination, SubmitJob,
};
use mixbuster_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of an accepted submission.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
}

/// A job's state together with its ID.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    #[serde(flatten)]
    pub state: JobState,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub job_id: JobId,
    /// Whether a registry entry existed.
    pub removed: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn find_job(state: &AppState, job_id: &str) -> AppResult<JobState> {
    state.registry.get(job_id).await.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })
    })
}

/// Read a multipart upload into a queued-ready request.
///
/// Fields: `audio_file` (required), `model_name`, `process_method`
/// (required), `callback_url`, `job_id`, `overrides` (JSON object). The
/// file is streamed to the uploads directory and kept there as
/// `<job_id>_<upload id>_<filename>`, unique per request even when two
/// requests name the same job.
/// With a `callback_url` the results are delivered remotely, otherwise
/// they stay in the work area.
pub(crate) async fn read_upload(state: &AppState, mut multipart: Multipart) -> AppResult<JobRequest> {
    let uploads = state.uploads_dir();
    tokio::fs::create_dir_all(&uploads).await?;

    let mut file: Option<(PathBuf, String, String)> = None;
    let mut model_name = None;
    let mut process_method = None;
    let mut callback_url = None;
    let mut job_id = None;
    let mut overrides = None;

    let parsed = async {
        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "audio_file" {
                let filename = field
                    .file_name()
                    .and_then(sanitize_filename)
                    .ok_or_else(|| {
                        CoreError::Validation(
                            "Field 'audio_file' has no usable filename".into(),
                        )
                    })?;
                let upload_id = new_job_id();
                let temp = uploads.join(format!("{upload_id}.part"));
                file = Some((temp.clone(), upload_id, filename));

                let mut out = tokio::fs::File::create(&temp).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                {
                    out.write_all(&chunk).await?;
                }
                out.flush().await?;
                continue;
            }

            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            match name.as_str() {
                "model_name" => model_name = Some(text),
                "process_method" => process_method = Some(text),
                "callback_url" => callback_url = Some(text),
                "job_id" => job_id = Some(text),
                "overrides" => overrides = Some(text),
                _ => {}
            }
        }
        Ok::<(), AppError>(())
    }
    .await;

    let built = parsed.and_then(|()| {
        let (temp, upload_id, original_filename) = file
            .as_ref()
            .cloned()
            .ok_or_else(|| CoreError::missing_field("audio_file"))?;
        let model_name = require_field("model_name", model_name)?;
        let process_method = require_field("process_method", process_method)?;

        let callback_url = callback_url.filter(|url| !url.trim().is_empty());
        if let Some(url) = &callback_url {
            validate_http_url("callback_url", url)?;
        }
        let job_id = match job_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                validate_job_id(id.trim())?;
                id.trim().to_string()
            }
            None => new_job_id(),
        };
        let overrides = match overrides.filter(|o| !o.trim().is_empty()) {
            Some(raw) => serde_json::from_str::<ParamLayer>(&raw).map_err(|e| {
                CoreError::Validation(format!("Field 'overrides' is not a JSON object: {e}"))
            })?,
            None => ParamLayer::new(),
        };
        let destination = match callback_url {
            Some(url) => ResultDestination::Remote {
                callback_url: Some(url),
            },
            None => ResultDestination::Local,
        };

        Ok((
            temp,
            JobRequest {
                source: InputSource::Uploaded(
                    uploads.join(format!("{job_id}_{upload_id}_{original_filename}")),
                ),
                requested_id: Some(job_id),
                original_filename,
                process_method,
                model_name,
                destination,
                overrides,
            },
        ))
    });

    match built {
        Ok((temp, request)) => {
            if let Some(job_id) = &request.requested_id {
                if state.registry.get(job_id).await.is_some() {
                    remove_quietly(&temp).await;
                    return Err(CoreError::Conflict(format!("Job '{job_id}' already exists")).into());
                }
            }
            if let InputSource::Uploaded(target) = &request.source {
                tokio::fs::rename(&temp, target).await?;
            }
            Ok(request)
        }
        Err(e) => {
            if let Some((temp, _, _)) = &file {
                remove_quietly(temp).await;
            }
            Err(e)
        }
    }
}

/// Submit `request`, removing its uploaded file if it is rejected.
pub(crate) async fn dispatch(state: &AppState, request: JobRequest) -> AppResult<JobId> {
    let upload = match &request.source {
        InputSource::Uploaded(path) => Some(path.clone()),
        InputSource::Url(_) => None,
    };
    match state.dispatcher.submit(request).await {
        Ok(job_id) => Ok(job_id),
        Err(e) => {
            if let Some(path) = upload {
                remove_quietly(&path).await;
            }
            Err(e.into())
        }
    }
}

/// Forget a job, stop it if it is queued or running, and delete its work
/// area and pending uploads. Idempotent.
pub(crate) async fn cleanup_job(state: &AppState, job_id: &str) -> AppResult<bool> {
    validate_job_id(job_id)?;

    if let Some(job) = state.registry.get(job_id).await {
        if !job.status.is_terminal() {
            tracing::warn!(job_id, "Cleaning up a job that is still processing");
        }
    }
    let removed = state.registry.delete(job_id).await;
    state.dispatcher.cancel(job_id);
    state.staging.cleanup(job_id).await?;

    let prefix = format!("{job_id}_");
    if let Ok(mut entries) = tokio::fs::read_dir(state.uploads_dir()).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                remove_quietly(&entry.path()).await;
            }
        }
    }

    tracing::info!(job_id, removed, "Job cleaned up");
    Ok(removed)
}

/// Stream one produced file as an attachment.
pub(crate) async fn serve_file(state: &AppState, job_id: &str, filename: &str) -> AppResult<Response> {
    let path = state.staging.file_in_work_area(job_id, filename)?;
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "File",
                id: format!("{job_id}/{filename}"),
            }));
        }
        Err(e) => return Err(e.into()),
    };
    let size = file.metadata().await?.len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(filename))
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::CONTENT_DISPOSITION, content_disposition(filename))
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// `attachment` disposition with an ASCII `filename` fallback and the exact
/// name as an RFC 5987 `filename*`.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();
    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'&' | b'+' | b'-'
            | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => encoded.push(char::from(byte)),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

async fn remove_quietly(path: &FsPath) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload");
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a job whose input is downloaded from `input_url`. Returns 202
/// with the job ID; the job runs in the background.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    let request = input.validate()?;
    let job_id = dispatch(&state, request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted { job_id },
        }),
    ))
}

/// POST /api/v1/jobs/upload
///
/// Submit a job with the input uploaded as multipart form data.
pub async fn upload_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let request = read_upload(&state, multipart).await?;
    let job_id = dispatch(&state, request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted { job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, &job_id).await?;
    Ok(Json(DataResponse {
        data: JobView { job_id, state: job },
    }))
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Remove the job and its files. Succeeds for unknown jobs too.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let removed = cleanup_job(&state, &job_id).await?;
    Ok(Json(DataResponse {
        data: CleanupResult { job_id, removed },
    }))
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/files/{filename}
pub async fn download_file(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> AppResult<Response> {
    serve_file(&state, &job_id, &filename).await
}
