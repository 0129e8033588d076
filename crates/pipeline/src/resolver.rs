//! Parameter resolution: from `(process_method, model_name)` to a fully
//! configured [`BackendConfiguration`].
//!
//! Resolution is a pure function of the models directory and the static
//! [`ModelCatalog`]. Parameters are layered, later layers winning per key:
//!
//! 1. family-wide defaults ([`TuningParams::default`]),
//! 2. the catalog entry matched by fingerprint or name,
//! 3. fields derived from the located artifact and its stem topology,
//! 4. per-request overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use mixbuster_core::backend::{
    demucs_stem_count_from_name, secondary_stem_for, BackendFamily, SeparatorKind, StemTopology,
    VOCAL_STEM,
};
use mixbuster_core::catalog::ModelCatalog;
use mixbuster_core::hashing::model_fingerprint;
use mixbuster_core::params::{ParamLayer, TuningParams};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Unsupported process method: '{0}'")]
    BackendUnsupported(String),

    #[error("{family} model not found: '{model_name}'")]
    ModelNotFound {
        family: BackendFamily,
        model_name: String,
    },

    #[error("Invalid parameters for model '{model_name}': {source}")]
    InvalidParameters {
        model_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to fingerprint {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// BackendConfiguration
// ---------------------------------------------------------------------------

/// Immutable, fully resolved parameter set for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendConfiguration {
    pub family: BackendFamily,
    pub kind: SeparatorKind,
    pub model_name: String,
    pub model_path: PathBuf,
    pub fingerprint: String,
    pub topology: StemTopology,
    pub params: TuningParams,
}

impl BackendConfiguration {
    /// Flat parameter object handed to the separator. The job-specific keys
    /// are written last and cannot be overridden by any layer.
    pub fn to_model_data(&self) -> Result<ParamLayer, serde_json::Error> {
        let mut data = self.params.to_layer()?;
        data.insert("process_method".into(), json!(self.family.name()));
        data.insert(
            "model_path".into(),
            json!(self.model_path.display().to_string()),
        );
        data.insert("model_name".into(), json!(self.model_name));
        data.insert("model_basename".into(), json!(self.model_name));
        Ok(data)
    }
}

/// A model artifact found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedModel {
    pub path: PathBuf,
    /// MDX checkpoint (`.ckpt`) rather than ONNX.
    pub is_checkpoint: bool,
}

// ---------------------------------------------------------------------------
// ParameterResolver
// ---------------------------------------------------------------------------

pub struct ParameterResolver {
    models_dir: PathBuf,
    catalog: Arc<ModelCatalog>,
    defaults: TuningParams,
}

impl ParameterResolver {
    pub fn new(models_dir: impl Into<PathBuf>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            models_dir: models_dir.into(),
            catalog,
            defaults: TuningParams::default(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Resolve a backend configuration. Blocking: it hashes the artifact,
    /// so async callers should run it on the blocking pool.
    pub fn resolve(
        &self,
        process_method: &str,
        model_name: &str,
        overrides: &ParamLayer,
    ) -> Result<BackendConfiguration, ResolutionError> {
        let family = BackendFamily::from_name(process_method)
            .ok_or_else(|| ResolutionError::BackendUnsupported(process_method.to_string()))?;
        let located = self.locate(family, model_name)?;

        let fingerprint =
            model_fingerprint(&located.path).map_err(|source| ResolutionError::Io {
                path: located.path.display().to_string(),
                source,
            })?;

        let empty = ParamLayer::new();
        let catalog_entry = self.catalog.lookup(Some(&fingerprint), model_name);
        if catalog_entry.is_none() {
            tracing::debug!(
                backend = %family,
                model = model_name,
                fingerprint = %fingerprint,
                "No catalog entry, using family defaults"
            );
        }
        let catalog_entry = catalog_entry.unwrap_or(&empty);

        let derived = derived_layer(family, model_name, &located, catalog_entry);
        let mut params = self
            .defaults
            .merged(&[catalog_entry, &derived, overrides])
            .map_err(|source| ResolutionError::InvalidParameters {
                model_name: model_name.to_string(),
                source,
            })?;
        // The secondary stem follows the final primary unless set explicitly.
        if family == BackendFamily::Mdx && !overrides.contains_key("secondary_stem") {
            params.common.secondary_stem = secondary_stem_for(&params.common.primary_stem);
        }

        let kind = match family {
            BackendFamily::Demucs => SeparatorKind::Demucs,
            BackendFamily::Mdx if params.mdx.is_mdx_c => SeparatorKind::MdxC,
            BackendFamily::Mdx => SeparatorKind::Mdx,
        };
        let topology = topology_of(family, &params);

        tracing::info!(
            backend = %family,
            model = model_name,
            path = %located.path.display(),
            stems = topology.count(),
            ?kind,
            "Backend configuration resolved"
        );

        Ok(BackendConfiguration {
            family,
            kind,
            model_name: model_name.to_string(),
            model_path: located.path,
            fingerprint,
            topology,
            params,
        })
    }

    /// Try the family's candidate paths in priority order.
    pub fn locate(
        &self,
        family: BackendFamily,
        model_name: &str,
    ) -> Result<LocatedModel, ResolutionError> {
        let not_found = || ResolutionError::ModelNotFound {
            family,
            model_name: model_name.to_string(),
        };
        if !is_plain_model_name(model_name) {
            return Err(not_found());
        }

        let family_dir = self.models_dir.join(family.models_subdir());
        let candidates: Vec<(PathBuf, bool)> = match family {
            BackendFamily::Mdx => vec![
                (family_dir.join(format!("{model_name}.onnx")), false),
                (family_dir.join(format!("{model_name}.ckpt")), true),
            ],
            BackendFamily::Demucs => vec![
                (
                    family_dir
                        .join("v3_v4_repo")
                        .join(format!("{model_name}.yaml")),
                    false,
                ),
                (family_dir.join(format!("{model_name}.ckpt")), false),
                (family_dir.join(format!("{model_name}.th")), false),
            ],
        };

        candidates
            .into_iter()
            .find(|(path, _)| path.is_file())
            .map(|(path, is_checkpoint)| LocatedModel {
                path,
                is_checkpoint,
            })
            .ok_or_else(not_found)
    }
}

/// Model names are file stems: no separators, no traversal.
fn is_plain_model_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0']) && !name.contains("..")
}

/// Fields implied by the artifact and the stem topology.
fn derived_layer(
    family: BackendFamily,
    model_name: &str,
    located: &LocatedModel,
    catalog_entry: &ParamLayer,
) -> ParamLayer {
    let mut layer = ParamLayer::new();
    match family {
        BackendFamily::Mdx => {
            let primary = catalog_entry
                .get("primary_stem")
                .and_then(Value::as_str)
                .unwrap_or(VOCAL_STEM);
            layer.insert("is_mdx_ckpt".into(), json!(located.is_checkpoint));
            layer.insert("primary_stem".into(), json!(primary));
            layer.insert("secondary_stem".into(), json!(secondary_stem_for(primary)));
        }
        BackendFamily::Demucs => {
            let stem_count = catalog_entry
                .get("demucs_stem_count")
                .and_then(Value::as_u64)
                .and_then(|n| u8::try_from(n).ok())
                .unwrap_or_else(|| demucs_stem_count_from_name(model_name));
            let topology = StemTopology::demucs(stem_count);
            layer.insert("demucs_stem_count".into(), json!(topology.count()));
            layer.insert("demucs_source_map".into(), json!(topology.source_map()));
            layer.insert("demucs_source_list".into(), json!(topology.stems));
        }
    }
    layer
}

/// Topology as seen by the separator, after every layer was applied.
fn topology_of(family: BackendFamily, params: &TuningParams) -> StemTopology {
    match family {
        BackendFamily::Mdx => StemTopology {
            stems: vec![
                params.common.primary_stem.clone(),
                params.common.secondary_stem.clone(),
            ],
        },
        BackendFamily::Demucs if !params.demucs.demucs_source_list.is_empty() => StemTopology {
            stems: params.demucs.demucs_source_list.clone(),
        },
        BackendFamily::Demucs => StemTopology::demucs(params.demucs.demucs_stem_count),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
