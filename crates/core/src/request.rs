//! Job submission DTOs and their validation.
//!
//! [`SubmitJob`] is the wire shape of `POST /api/v1/jobs`. Every field is
//! optional at the serde level; a missing field is reported as a validation
//! error naming it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::naming;
use crate::params::ParamLayer;

// ---------------------------------------------------------------------------
// Destination / source
// ---------------------------------------------------------------------------

/// Where a job's results go once processing succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultDestination {
    /// Outputs stay in the work area and are served by the download route.
    Local,
    /// Outputs are archived, uploaded to the object store, and optionally
    /// announced to `callback_url`.
    Remote {
        #[serde(default)]
        callback_url: Option<String>,
    },
}

/// Where the input artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Download from a remote URL.
    Url(String),
    /// A file already received by this process (multipart upload).
    Uploaded(PathBuf),
}

// ---------------------------------------------------------------------------
// SubmitJob
// ---------------------------------------------------------------------------

/// DTO for submitting a job via `POST /api/v1/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitJob {
    /// Caller-supplied job ID; generated when absent.
    pub job_id: Option<String>,
    pub input_url: Option<String>,
    pub original_filename: Option<String>,
    /// Backend family wire name, e.g. `"MDX-Net"` or `"Demucs"`.
    pub process_method: Option<String>,
    pub model_name: Option<String>,
    pub destination: Option<ResultDestination>,
    /// Per-request parameter overrides, applied last.
    #[serde(default)]
    pub overrides: ParamLayer,
}

/// A validated job request, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub requested_id: Option<String>,
    pub source: InputSource,
    pub original_filename: String,
    pub process_method: String,
    pub model_name: String,
    pub destination: ResultDestination,
    pub overrides: ParamLayer,
}

impl SubmitJob {
    /// Check required fields in a fixed order and build a [`JobRequest`].
    ///
    /// The backend family is only checked for presence here; whether it is
    /// supported is decided by the resolver, after the job is accepted.
    pub fn validate(self) -> Result<JobRequest, CoreError> {
        let process_method = require_field("process_method", self.process_method)?;
        let model_name = require_field("model_name", self.model_name)?;
        let input_url = require_field("input_url", self.input_url)?;
        validate_http_url("input_url", &input_url)?;
        let destination = self
            .destination
            .ok_or_else(|| CoreError::missing_field("destination"))?;
        validate_destination(&destination)?;

        if let Some(id) = &self.job_id {
            naming::validate_job_id(id)?;
        }

        let original_filename = match self.original_filename {
            Some(name) => naming::sanitize_filename(&name).ok_or_else(|| {
                CoreError::Validation("Field 'original_filename' is not a usable filename".into())
            })?,
            None => filename_from_url(&input_url).ok_or_else(|| {
                CoreError::Validation(
                    "Field 'original_filename' is required when input_url has no filename"
                        .into(),
                )
            })?,
        };

        Ok(JobRequest {
            requested_id: self.job_id,
            source: InputSource::Url(input_url),
            original_filename,
            process_method,
            model_name,
            destination,
            overrides: self.overrides,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Require a non-blank string field, returning it trimmed.
pub fn require_field(field: &str, value: Option<String>) -> Result<String, CoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(CoreError::missing_field(field)),
    }
}

/// Validate that a URL field starts with `http://` or `https://`.
pub fn validate_http_url(field: &str, url: &str) -> Result<(), CoreError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(CoreError::Validation(format!(
            "Field '{field}' must start with http:// or https://, got: '{url}'"
        )));
    }
    Ok(())
}

pub fn validate_destination(destination: &ResultDestination) -> Result<(), CoreError> {
    if let ResultDestination::Remote {
        callback_url: Some(url),
    } = destination
    {
        validate_http_url("destination.callback_url", url)?;
    }
    Ok(())
}

/// Last path segment of a URL, without query string or fragment.
fn filename_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = path.split_once('/')?;
    naming::sanitize_filename(path)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn valid_submission() -> SubmitJob {
        serde_json::from_value(json!({
            "input_url": "https://r2.example.com/uploads/song.mp3",
            "process_method": "MDX-Net",
            "model_name": "UVR-MDX-NET-Inst_HQ_3",
            "destination": { "type": "remote", "callback_url": "https://app.example.com/done" }
        }))
        .unwrap()
    }

    fn validation_message(result: Result<JobRequest, CoreError>) -> String {
        match result {
            Err(CoreError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_submission_passes() {
        let request = valid_submission().validate().unwrap();
        assert_eq!(request.original_filename, "song.mp3");
        assert_eq!(request.process_method, "MDX-Net");
        assert_matches!(request.source, InputSource::Url(_));
        assert!(request.requested_id.is_none());
    }

    #[test]
    fn each_missing_field_is_named() {
        for field in ["process_method", "model_name", "input_url"] {
            let mut submission = valid_submission();
            match field {
                "process_method" => submission.process_method = None,
                "model_name" => submission.model_name = Some("   ".into()),
                _ => submission.input_url = None,
            }
            let msg = validation_message(submission.validate());
            assert!(msg.contains(field), "message '{msg}' should name {field}");
        }
    }

    #[test]
    fn missing_destination_is_named() {
        let mut submission = valid_submission();
        submission.destination = None;
        assert!(validation_message(submission.validate()).contains("destination"));
    }

    #[test]
    fn non_http_input_rejected() {
        let mut submission = valid_submission();
        submission.input_url = Some("file:///etc/passwd".into());
        assert!(validation_message(submission.validate()).contains("input_url"));
    }

    #[test]
    fn bad_callback_url_rejected() {
        let mut submission = valid_submission();
        submission.destination = Some(ResultDestination::Remote {
            callback_url: Some("ftp://nope".into()),
        });
        assert!(validation_message(submission.validate()).contains("callback_url"));
    }

    #[test]
    fn caller_supplied_job_id_is_checked() {
        let mut submission = valid_submission();
        submission.job_id = Some("../escape".into());
        assert_matches!(submission.validate(), Err(CoreError::Validation(_)));

        let mut submission = valid_submission();
        submission.job_id = Some("job-42".into());
        assert_eq!(
            submission.validate().unwrap().requested_id.as_deref(),
            Some("job-42")
        );
    }

    #[test]
    fn filename_is_sanitized_or_derived() {
        let mut submission = valid_submission();
        submission.original_filename = Some("../../evil.wav".into());
        assert_eq!(submission.validate().unwrap().original_filename, "evil.wav");

        let mut submission = valid_submission();
        submission.input_url = Some("https://cdn.example.com/a/b/track.flac?sig=1".into());
        assert_eq!(submission.validate().unwrap().original_filename, "track.flac");

        let mut submission = valid_submission();
        submission.input_url = Some("https://cdn.example.com".into());
        assert!(validation_message(submission.validate()).contains("original_filename"));
    }

    #[test]
    fn local_destination_deserializes() {
        let destination: ResultDestination = serde_json::from_value(json!({ "type": "local" })).unwrap();
        assert_eq!(destination, ResultDestination::Local);
    }
}
