//! Static catalog of known-good tuning parameters per model.
//!
//! Two on-disk formats are accepted:
//!
//! ```text
//! { "<md5>": { "compensate": 1.035, ... }, ... }              (flat, keyed by fingerprint)
//! { "version": 1, "by_hash": { ... }, "by_name": { ... } }     (versioned)
//! ```
//!
//! The catalog is loaded once at start-up and shared read-only.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::params::ParamLayer;

/// Version assigned to catalogs in the flat format.
pub const FLAT_CATALOG_VERSION: u32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid catalog: {0}")]
    Format(String),
}

#[derive(Deserialize)]
struct VersionedCatalog {
    version: u32,
    #[serde(default)]
    by_hash: HashMap<String, ParamLayer>,
    #[serde(default)]
    by_name: HashMap<String, ParamLayer>,
}

/// Read-only mapping from fingerprint or model name to parameter overrides.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    version: u32,
    by_hash: HashMap<String, ParamLayer>,
    by_name: HashMap<String, ParamLayer>,
}

impl ModelCatalog {
    /// A catalog with no entries; every lookup falls back to family defaults.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(text)?;
        let obj = value
            .as_object()
            .ok_or_else(|| CatalogError::Format("top level must be a JSON object".into()))?;

        if obj.contains_key("version") || obj.contains_key("by_hash") || obj.contains_key("by_name")
        {
            let versioned: VersionedCatalog = serde_json::from_value(value)?;
            return Ok(Self {
                version: versioned.version,
                by_hash: versioned.by_hash,
                by_name: versioned.by_name,
            });
        }

        let mut by_hash = HashMap::with_capacity(obj.len());
        for (hash, entry) in obj {
            let params = entry.as_object().ok_or_else(|| {
                CatalogError::Format(format!("entry '{hash}' must be a JSON object"))
            })?;
            by_hash.insert(hash.clone(), params.clone());
        }

        Ok(Self {
            version: FLAT_CATALOG_VERSION,
            by_hash,
            by_name: HashMap::new(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Load `path`, falling back to an empty catalog when it is missing or
    /// unreadable. Jobs still run, just without model-specific tuning.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(catalog) => {
                tracing::info!(
                    path = %path.display(),
                    version = catalog.version,
                    entries = catalog.len(),
                    "Model catalog loaded",
                );
                catalog
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Model catalog unavailable, using family defaults only",
                );
                Self::empty()
            }
        }
    }

    /// Find the entry for a model: by fingerprint first, then by name.
    pub fn lookup(&self, fingerprint: Option<&str>, model_name: &str) -> Option<&ParamLayer> {
        fingerprint
            .and_then(|hash| self.by_hash.get(hash))
            .or_else(|| self.by_name.get(model_name))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.by_hash.len() + self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
