use std::path::Path;

use async_trait::async_trait;

/// Error type for object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading the local file to upload failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote store rejected or failed the write.
    #[error("Upload of '{key}' failed: {message}")]
    Upload { key: String, message: String },
}

/// A place packaged results are published to.
///
/// Implementations return a URL under which the object can be fetched by
/// whoever receives the completion callback.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short identifier used in logs and the health payload.
    fn name(&self) -> &'static str;

    /// Store the file at `path` under `key` and return its public URL.
    async fn put(&self, key: &str, path: &Path) -> Result<String, StorageError>;
}

/// Join a public base (with or without scheme or trailing slash) and a key.
pub fn public_url(base: &str, key: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}/{key}")
    } else {
        format!("https://{base}/{key}")
    }
}
