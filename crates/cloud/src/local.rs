//! Directory-backed object store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::store::{public_url, ObjectStore, StorageError};

/// Copies objects into `root/<key>` and reports them under `public_base_url`.
pub struct DirectoryObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl DirectoryObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStore for DirectoryObjectStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "object keys must be plain file names".into(),
            });
        }

        let upload_err = |e: std::io::Error| StorageError::Upload {
            key: key.to_string(),
            message: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(upload_err)?;

        let target = self.root.join(key);
        tokio::fs::copy(path, &target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::Read {
                    path: path.display().to_string(),
                    source: e,
                }
            } else {
                upload_err(e)
            }
        })?;

        let url = public_url(&self.public_base_url, key);
        tracing::debug!(target = %target.display(), url = %url, "Object stored locally");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn put_copies_file_and_returns_url() {
        let src_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("out.zip");
        std::fs::write(&src, b"PK").unwrap();

        let store = DirectoryObjectStore::new(store_dir.path().join("results"), "http://localhost:5010/results");
        let url = store.put("j1-mixbusted.zip", &src).await.unwrap();

        assert_eq!(url, "http://localhost:5010/results/j1-mixbusted.zip");
        let stored = std::fs::read(store_dir.path().join("results/j1-mixbusted.zip")).unwrap();
        assert_eq!(stored, b"PK");
    }

    #[tokio::test]
    async fn missing_source_is_a_read_error() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(store_dir.path(), "http://localhost/results");
        let result = store.put("a.zip", Path::new("/nonexistent/a.zip")).await;
        assert_matches!(result, Err(StorageError::Read { .. }));
    }

    #[tokio::test]
    async fn nested_keys_rejected() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = DirectoryObjectStore::new(store_dir.path(), "http://localhost/results");
        let result = store.put("../escape.zip", Path::new("/tmp/x")).await;
        assert_matches!(result, Err(StorageError::Upload { .. }));
    }
}
