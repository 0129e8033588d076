//! The external processing capability.
//!
//! [`SeparationBackend`] is the seam between the orchestration engine and
//! whatever actually splits audio into stems. The production implementation,
//! [`SubprocessSeparator`], runs an external program and speaks a small
//! line protocol with it:
//!
//! - **stdin**: one JSON document with `separator`, `model_data` and
//!   `process_data`, then EOF.
//! - **stdout**: `PROGRESS <fraction>` or `{"progress": <fraction>}` lines
//!   report progress; a `{"error": "<message>"}` line reports a failure.
//!   Anything else is logged at debug level.
//! - **exit status**: zero on success.
//!
//! The input path and output directory are also exported as
//! `MIXBUSTER_INPUT` and `MIXBUSTER_OUTPUT_DIR`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::resolver::BackendConfiguration;

/// Receives processing progress as a fraction in `0.0..=1.0`.
pub type ProgressSink = Arc<dyn Fn(f64) + Send + Sync>;

/// How much of the separator's stderr is kept for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

pub const INPUT_ENV: &str = "MIXBUSTER_INPUT";
pub const OUTPUT_DIR_ENV: &str = "MIXBUSTER_OUTPUT_DIR";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SeparationError {
    #[error("Failed to start separator: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to encode separator input: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Reported(String),

    #[error("Separator exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Separator timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Separation cancelled")]
    Cancelled,

    #[error("Separator produced no output files")]
    NoOutput,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SeparationBackend: Send + Sync {
    /// Separate `input` into stems written to `output_dir`.
    ///
    /// Implementations report progress through `progress` with
    /// non-decreasing fractions and should stop promptly once `cancel`
    /// fires.
    async fn run(
        &self,
        config: &BackendConfiguration,
        input: &Path,
        output_dir: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), SeparationError>;
}

// ---------------------------------------------------------------------------
// SubprocessSeparator
// ---------------------------------------------------------------------------

pub struct SubprocessSeparator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

impl SubprocessSeparator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Kill the separator if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn payload(
        config: &BackendConfiguration,
        input: &Path,
        output_dir: &Path,
    ) -> Result<Value, serde_json::Error> {
        let audio_file_base = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(json!({
            "separator": config.kind,
            "model_data": config.to_model_data()?,
            "process_data": {
                "audio_file": input.display().to_string(),
                "audio_file_base": audio_file_base,
                "export_path": output_dir.display().to_string(),
            },
        }))
    }
}

#[async_trait]
impl SeparationBackend for SubprocessSeparator {
    async fn run(
        &self,
        config: &BackendConfiguration,
        input: &Path,
        output_dir: &Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), SeparationError> {
        let payload = serde_json::to_vec(&Self::payload(config, input, output_dir)?)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(INPUT_ENV, input)
            .env(OUTPUT_DIR_ENV, output_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(SeparationError::Spawn)?;
        tracing::debug!(
            program = %self.program.display(),
            pid = child.id(),
            model = %config.model_name,
            "Separator started"
        );

        if let Some(mut stdin) = child.stdin.take() {
            // The separator may exit without reading its input.
            let _ = stdin.write_all(&payload).await;
            drop(stdin);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_status_lines(stdout, progress));
        let stderr_task = tokio::spawn(read_tail(stderr));

        let deadline = async {
            match self.timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = cancel.cancelled() => Outcome::Cancelled,
            limit = deadline => Outcome::TimedOut(limit),
        };

        let status = match outcome {
            Outcome::Exited(status) => status.map_err(SeparationError::Spawn)?,
            Outcome::Cancelled => {
                let _ = child.kill().await;
                return Err(SeparationError::Cancelled);
            }
            Outcome::TimedOut(limit) => {
                let _ = child.kill().await;
                return Err(SeparationError::TimedOut(limit));
            }
        };

        let reported = stdout_task.await.unwrap_or_default();
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if let Some(message) = reported {
            return Err(SeparationError::Reported(message));
        }
        if !status.success() {
            return Err(SeparationError::Failed {
                code: status.code().unwrap_or(-1),
                stderr: stderr_tail.trim().to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Line protocol
// ---------------------------------------------------------------------------

/// One recognised line of separator stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    Progress(f64),
    Error(String),
}

pub fn parse_status_line(line: &str) -> Option<StatusLine> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("PROGRESS") {
        return rest.trim().parse().ok().map(StatusLine::Progress);
    }
    if line.starts_with('{') {
        let value: Value = serde_json::from_str(line).ok()?;
        if let Some(fraction) = value.get("progress").and_then(Value::as_f64) {
            return Some(StatusLine::Progress(fraction));
        }
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Some(StatusLine::Error(message.to_string()));
        }
    }
    None
}

/// Forward progress lines to `sink`; return the last reported error.
async fn read_status_lines<R: AsyncRead + Unpin>(
    stdout: Option<R>,
    sink: ProgressSink,
) -> Option<String> {
    let mut reported = None;
    let Some(stdout) = stdout else {
        return reported;
    };
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_status_line(&line) {
            Some(StatusLine::Progress(fraction)) => sink(fraction),
            Some(StatusLine::Error(message)) => reported = Some(message),
            None => tracing::debug!(line = %line, "Separator output"),
        }
    }
    reported
}

/// Read a stream to EOF, keeping only the last [`STDERR_TAIL_BYTES`].
async fn read_tail<R: AsyncRead + Unpin>(handle: Option<R>) -> String {
    let mut tail: Vec<u8> = Vec::new();
    if let Some(mut h) = handle {
        let mut buf = [0u8; 8192];
        while let Ok(n) = h.read(&mut buf).await {
            if n == 0 {
                break;
            }
            tail.extend_from_slice(&buf[..n]);
            if tail.len() > STDERR_TAIL_BYTES {
                tail.drain(..tail.len() - STDERR_TAIL_BYTES);
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
