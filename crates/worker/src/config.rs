use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mixbuster_cloud::R2Config;

/// Where published archives go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    S3(R2Config),
    Local { dir: PathBuf, public_base_url: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("STORAGE_BACKEND=s3 requires R2_ENDPOINT_URL, R2_ACCESS_KEY_ID, R2_SECRET_ACCESS_KEY, R2_BUCKET_NAME and R2_PUBLIC_DOMAIN")]
    MissingR2,
}

/// Processing engine configuration loaded from environment variables.
///
/// | Env Var                  | Default                                          |
/// |--------------------------|--------------------------------------------------|
/// | `MODELS_DIR`             | `models`                                         |
/// | `MODEL_CATALOG_PATH`     | `<MODELS_DIR>/MDX_Net_Models/model_data/model_data.json` |
/// | `WORK_DIR`               | `/tmp/mixbuster`                                 |
/// | `SEPARATOR_PROGRAM`      | `python3`                                        |
/// | `SEPARATOR_ARGS`         | `separate_cli.py` (whitespace separated)         |
/// | `MAX_CONCURRENT_JOBS`    | `2`                                              |
/// | `JOB_QUEUE_CAPACITY`     | `64`                                             |
/// | `JOB_TIMEOUT_SECS`       | `3600`                                           |
/// | `NETWORK_RETRY_ATTEMPTS` | `0`                                              |
/// | `CLEANUP_AFTER_DELIVERY` | `false`                                          |
/// | `STORAGE_BACKEND`        | `s3` when all `R2_*` vars are set, else `local`  |
/// | `LOCAL_STORAGE_DIR`      | `storage/results`                                |
/// | `LOCAL_STORAGE_BASE_URL` | `http://localhost:5010/results`                  |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub models_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub work_dir: PathBuf,
    pub separator_program: String,
    pub separator_args: Vec<String>,
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    pub network_retry_attempts: u32,
    pub cleanup_after_delivery: bool,
    pub storage: StorageConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let models_dir = PathBuf::from(get("MODELS_DIR").unwrap_or_else(|| "models".into()));
        let catalog_path = get("MODEL_CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                models_dir
                    .join("MDX_Net_Models")
                    .join("model_data")
                    .join("model_data.json")
            });

        let storage = match get("STORAGE_BACKEND").as_deref() {
            Some("s3") => StorageConfig::S3(R2Config::from_lookup(&lookup).ok_or(ConfigError::MissingR2)?),
            Some("local") | None => match (get("STORAGE_BACKEND"), R2Config::from_lookup(&lookup)) {
                (None, Some(r2)) => StorageConfig::S3(r2),
                _ => StorageConfig::Local {
                    dir: PathBuf::from(
                        get("LOCAL_STORAGE_DIR").unwrap_or_else(|| "storage/results".into()),
                    ),
                    public_base_url: get("LOCAL_STORAGE_BASE_URL")
                        .unwrap_or_else(|| "http://localhost:5010/results".into()),
                },
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            models_dir,
            catalog_path,
            work_dir: PathBuf::from(get("WORK_DIR").unwrap_or_else(|| "/tmp/mixbuster".into())),
            separator_program: get("SEPARATOR_PROGRAM").unwrap_or_else(|| "python3".into()),
            separator_args: get("SEPARATOR_ARGS")
                .unwrap_or_else(|| "separate_cli.py".into())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            max_concurrent_jobs: parse_or(&get, "MAX_CONCURRENT_JOBS", 2usize)?.max(1),
            queue_capacity: parse_or(&get, "JOB_QUEUE_CAPACITY", 64usize)?.max(1),
            job_timeout: Duration::from_secs(parse_or(&get, "JOB_TIMEOUT_SECS", 3600u64)?),
            network_retry_attempts: parse_or(&get, "NETWORK_RETRY_ATTEMPTS", 0u32)?,
            cleanup_after_delivery: parse_or(&get, "CLEANUP_AFTER_DELIVERY", false)?,
            storage,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
