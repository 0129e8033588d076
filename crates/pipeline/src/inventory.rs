//! Installed model listing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use mixbuster_core::backend::BackendFamily;

/// Extensions of model artifacts and their descriptors.
const MODEL_EXTENSIONS: &[&str] = &["onnx", "ckpt", "yaml", "gz", "th"];

pub struct ModelInventory {
    models_dir: PathBuf,
}

impl ModelInventory {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Model names per family wire name, de-duplicated and sorted.
    ///
    /// Walks the filesystem; run it on the blocking pool.
    pub fn list(&self) -> BTreeMap<&'static str, Vec<String>> {
        BackendFamily::ALL
            .into_iter()
            .map(|family| {
                let dir = self.models_dir.join(family.models_subdir());
                (family.name(), model_names_in(&dir))
            })
            .collect()
    }
}

fn model_names_in(dir: &Path) -> Vec<String> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "Model directory not found");
        return Vec::new();
    }

    let names: BTreeSet<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.path();
            let ext = path.extension()?.to_str()?;
            if !MODEL_EXTENSIONS.contains(&ext) {
                return None;
            }
            path.file_stem()?.to_str().map(str::to_string)
        })
        .collect();
    names.into_iter().collect()
}
