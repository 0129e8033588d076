//! Single-shot job events, as delivered to a serverless handler.
//!
//! ```json
//! {"input": {"jobId": "..", "audioUrl": "..", "originalFilename": "..",
//!            "model_name": "..", "process_method": "..", "baseUrl": ".."}}
//! ```

use serde::{Deserialize, Serialize};

use mixbuster_core::error::CoreError;
use mixbuster_core::request::{require_field, JobRequest, ResultDestination, SubmitJob};

/// Path appended to `baseUrl` for the completion callback.
pub const FINISH_JOB_PATH: &str = "/mixbuster/finish_job.php";

#[derive(Debug, Deserialize)]
pub struct HandlerEvent {
    pub input: HandlerInput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerInput {
    pub job_id: Option<String>,
    pub audio_url: Option<String>,
    pub original_filename: Option<String>,
    #[serde(rename = "model_name")]
    pub model_name: Option<String>,
    #[serde(rename = "process_method")]
    pub process_method: Option<String>,
    pub base_url: Option<String>,
}

impl HandlerInput {
    /// Every field is required; the first missing one is reported.
    pub fn into_request(self) -> Result<JobRequest, CoreError> {
        let job_id = require_field("jobId", self.job_id)?;
        let audio_url = require_field("audioUrl", self.audio_url)?;
        let original_filename = require_field("originalFilename", self.original_filename)?;
        let model_name = require_field("model_name", self.model_name)?;
        let process_method = require_field("process_method", self.process_method)?;
        let base_url = require_field("baseUrl", self.base_url)?;

        let callback_url = format!("{}{FINISH_JOB_PATH}", base_url.trim_end_matches('/'));

        SubmitJob {
            job_id: Some(job_id),
            input_url: Some(audio_url),
            original_filename: Some(original_filename),
            process_method: Some(process_method),
            model_name: Some(model_name),
            destination: Some(ResultDestination::Remote {
                callback_url: Some(callback_url),
            }),
            overrides: Default::default(),
        }
        .validate()
    }
}

/// What the handler prints when it finishes.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HandlerOutput {
    Success {
        status: &'static str,
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Failure {
        error: String,
    },
}

impl HandlerOutput {
    pub fn success(job_id: impl Into<String>) -> Self {
        Self::Success {
            status: "success",
            job_id: job_id.into(),
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
