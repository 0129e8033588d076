/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-host deployment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5010`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Timeout for the multipart upload routes in seconds (default: `3600`).
    pub upload_timeout_secs: u64,
    /// How long shutdown waits for running jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body (default: 512 MiB).
    pub max_upload_bytes: usize,
    /// Terminal jobs older than this are swept (default: one day).
    pub job_retention_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default               |
    /// |-------------------------|-----------------------|
    /// | `HOST`                  | `0.0.0.0`             |
    /// | `PORT`                  | `5010`                |
    /// | `CORS_ORIGINS`          | `https://audiofb.com` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                  |
    /// | `UPLOAD_TIMEOUT_SECS`   | `3600`                |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                  |
    /// | `MAX_UPLOAD_BYTES`      | `536870912`           |
    /// | `JOB_RETENTION_SECS`    | `86400`               |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5010".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "https://audiofb.com".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let upload_timeout_secs: u64 = std::env::var("UPLOAD_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("UPLOAD_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "536870912".into())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let job_retention_secs: u64 = std::env::var("JOB_RETENTION_SECS")
            .unwrap_or_else(|_| "86400".into())
            .parse()
            .expect("JOB_RETENTION_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            upload_timeout_secs,
            shutdown_timeout_secs,
            max_upload_bytes,
            job_retention_secs,
        }
    }
}
