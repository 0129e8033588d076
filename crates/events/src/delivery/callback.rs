//! Completion callback delivery.
//!
//! [`CallbackClient`] POSTs a form-encoded [`CompletionNotice`] to the job
//! owner's completion endpoint. Delivery is attempted exactly once; a failed
//! notice is reported to the caller and never resent.

use std::time::Duration;

use serde::Serialize;

/// HTTP request timeout for the callback.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser-like User-Agent sent with every notice.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for callback delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Callback returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// Form fields sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotice {
    pub job_id: String,
    pub download_url: String,
    pub original_filename: String,
}

// ---------------------------------------------------------------------------
// CallbackClient
// ---------------------------------------------------------------------------

pub struct CallbackClient {
    client: reqwest::Client,
}

impl CallbackClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// Send `notice` to `url` once.
    pub async fn notify(&self, url: &str, notice: &CompletionNotice) -> Result<(), CallbackError> {
        let response = self.client.post(url).form(notice).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, job_id = %notice.job_id, status = status.as_u16(), "Completion callback rejected");
            return Err(CallbackError::HttpStatus(status.as_u16()));
        }
        tracing::info!(url, job_id = %notice.job_id, "Completion callback delivered");
        Ok(())
    }
}

impl Default for CallbackClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
