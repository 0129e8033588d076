//! Typed tuning parameters handed to the processing capability.
//!
//! The parameter set is split into composable groups: [`CommonParams`]
//! shared by every family, [`MdxParams`] and [`DemucsParams`] for the two
//! families, and [`PassthroughParams`] for settings the separators accept
//! but this service never reads. Keys that no group knows about (e.g. new
//! catalog fields) are kept verbatim in [`TuningParams::extra`].
//!
//! All groups serialize flat, so a merged parameter set is one JSON object
//! with the same keys the separators have always consumed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::{INST_STEM, VOCAL_STEM};

/// One layer of parameter overrides (catalog entry, topology, request).
pub type ParamLayer = Map<String, Value>;

pub const DEMUCS_V4: &str = "v4";
pub const DEFAULT_SEGMENT: &str = "Default";
pub const ALL_STEMS: &str = "All Stems";
pub const WAV: &str = "WAV";
pub const WAV_TYPE_16: &str = "PCM_16";

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Output format, device and stem-role settings shared by all families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonParams {
    pub is_gpu_conversion: bool,
    pub device_set: String,
    pub is_use_opencl: bool,
    pub wav_type_set: String,
    pub mp3_bit_set: String,
    pub save_format: String,
    pub is_normalization: bool,
    pub is_primary_stem_only: bool,
    pub is_secondary_stem_only: bool,
    pub primary_stem: String,
    pub secondary_stem: String,
    pub primary_model_primary_stem: String,
    pub primary_stem_native: String,
    pub model_samplerate: u32,
    pub chunks: u32,
    pub margin: u32,
    pub is_pitch_change: bool,
    pub semitone_shift: f64,
    pub is_match_frequency_pitch: bool,
    pub is_invert_spec: bool,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            is_gpu_conversion: true,
            device_set: "0".into(),
            is_use_opencl: false,
            wav_type_set: WAV_TYPE_16.into(),
            mp3_bit_set: "320k".into(),
            save_format: WAV.into(),
            is_normalization: false,
            is_primary_stem_only: false,
            is_secondary_stem_only: false,
            primary_stem: VOCAL_STEM.into(),
            secondary_stem: INST_STEM.into(),
            primary_model_primary_stem: VOCAL_STEM.into(),
            primary_stem_native: VOCAL_STEM.into(),
            model_samplerate: 44_100,
            chunks: 0,
            margin: 44_100,
            is_pitch_change: false,
            semitone_shift: 0.0,
            is_match_frequency_pitch: false,
            is_invert_spec: false,
        }
    }
}

/// MDX-Net (and MDX-C) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdxParams {
    pub is_mdx_ckpt: bool,
    pub is_mdx_c: bool,
    pub mdx_c_configs: Option<Value>,
    pub is_mdx_c_seg_def: bool,
    pub mdx_batch_size: u32,
    pub compensate: f64,
    pub mdx_segment_size: u32,
    pub mdx_dim_f_set: Option<u32>,
    pub mdx_dim_t_set: Option<u32>,
    pub mdx_n_fft_scale_set: Option<u32>,
    pub overlap_mdx: f64,
    pub overlap_mdx23: u32,
    pub is_mdx_combine_stems: bool,
    pub mdxnet_stem_select: String,
    pub is_denoise: bool,
    pub is_denoise_model: bool,
}

impl Default for MdxParams {
    fn default() -> Self {
        Self {
            is_mdx_ckpt: false,
            is_mdx_c: false,
            mdx_c_configs: None,
            is_mdx_c_seg_def: false,
            mdx_batch_size: 1,
            compensate: 1.035,
            mdx_segment_size: 256,
            mdx_dim_f_set: None,
            mdx_dim_t_set: None,
            mdx_n_fft_scale_set: None,
            overlap_mdx: 0.5,
            overlap_mdx23: 8,
            is_mdx_combine_stems: false,
            mdxnet_stem_select: VOCAL_STEM.into(),
            is_denoise: false,
            is_denoise_model: false,
        }
    }
}

/// Demucs settings, including the topology-derived source map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemucsParams {
    pub demucs_version: String,
    pub segment: String,
    pub shifts: u32,
    pub overlap: f64,
    pub is_split_mode: bool,
    pub is_chunk_demucs: bool,
    pub demucs_stems: String,
    pub is_demucs_combine_stems: bool,
    pub demucs_source_list: Vec<String>,
    pub demucs_source_map: BTreeMap<String, usize>,
    pub demucs_stem_count: u8,
    pub is_demucs_pre_proc_model_inst_mix: bool,
}

impl Default for DemucsParams {
    fn default() -> Self {
        Self {
            demucs_version: DEMUCS_V4.into(),
            segment: DEFAULT_SEGMENT.into(),
            shifts: 2,
            overlap: 0.25,
            is_split_mode: true,
            is_chunk_demucs: true,
            demucs_stems: ALL_STEMS.into(),
            is_demucs_combine_stems: true,
            demucs_source_list: Vec::new(),
            demucs_source_map: BTreeMap::new(),
            demucs_stem_count: 0,
            is_demucs_pre_proc_model_inst_mix: false,
        }
    }
}

/// Settings of other architectures, ensembles and secondary models.
///
/// Nothing in this service reads them; they are forwarded so separators
/// see the complete parameter set they were written against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughParams {
    pub is_tta: bool,
    pub is_post_process: bool,
    pub is_high_end_process: String,
    pub post_process_threshold: f64,
    pub aggression_setting: f64,
    pub batch_size: u32,
    pub window_size: u32,
    pub is_ensemble_mode: bool,
    pub is_secondary_model_activated: bool,
    pub secondary_model: Option<String>,
    pub pre_proc_model: Option<String>,
    pub is_secondary_model: bool,
    pub mixer_path: String,
    pub model_capacity: (u32, u32),
    pub is_vr_51_model: bool,
    pub is_pre_proc_model: bool,
    pub is_deverb_vocals: bool,
    pub is_mixer_mode: bool,
    pub secondary_model_scale: f64,
    #[serde(rename = "DENOISER_MODEL")]
    pub denoiser_model: Option<String>,
    #[serde(rename = "DEVERBER_MODEL")]
    pub deverber_model: Option<String>,
    pub vocal_split_model: Option<String>,
    pub is_vocal_split_model: bool,
    pub is_save_inst_vocal_splitter: bool,
    pub is_inst_only_voc_splitter: bool,
    pub is_karaoke: bool,
    pub is_bv_model: bool,
    pub bv_model_rebalance: f64,
    pub is_sec_bv_rebalance: bool,
    pub deverb_vocal_opt: Option<String>,
    pub is_save_vocal_only: bool,
    pub secondary_model_4_stem: Vec<Option<String>>,
    pub secondary_model_4_stem_scale: Vec<f64>,
    pub ensemble_primary_stem: String,
    pub is_multi_stem_ensemble: bool,
}

impl Default for PassthroughParams {
    fn default() -> Self {
        Self {
            is_tta: false,
            is_post_process: false,
            is_high_end_process: "none".into(),
            post_process_threshold: 0.1,
            aggression_setting: 0.1,
            batch_size: 4,
            window_size: 512,
            is_ensemble_mode: false,
            is_secondary_model_activated: false,
            secondary_model: None,
            pre_proc_model: None,
            is_secondary_model: false,
            mixer_path: "lib_v5/mixer.ckpt".into(),
            model_capacity: (64, 128),
            is_vr_51_model: false,
            is_pre_proc_model: false,
            is_deverb_vocals: false,
            is_mixer_mode: false,
            secondary_model_scale: 0.5,
            denoiser_model: None,
            deverber_model: None,
            vocal_split_model: None,
            is_vocal_split_model: false,
            is_save_inst_vocal_splitter: false,
            is_inst_only_voc_splitter: false,
            is_karaoke: false,
            is_bv_model: false,
            bv_model_rebalance: 0.0,
            is_sec_bv_rebalance: false,
            deverb_vocal_opt: None,
            is_save_vocal_only: false,
            secondary_model_4_stem: vec![None; 4],
            secondary_model_4_stem_scale: vec![0.5; 4],
            ensemble_primary_stem: VOCAL_STEM.into(),
            is_multi_stem_ensemble: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TuningParams
// ---------------------------------------------------------------------------

/// The complete, flat parameter set for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningParams {
    #[serde(flatten)]
    pub common: CommonParams,
    #[serde(flatten)]
    pub mdx: MdxParams,
    #[serde(flatten)]
    pub demucs: DemucsParams,
    #[serde(flatten)]
    pub passthrough: PassthroughParams,
    /// Keys no group recognises; must stay the last flattened field so it
    /// only collects what the typed groups did not consume.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TuningParams {
    /// Overlay `layers` on top of `self`, later layers winning per key.
    ///
    /// The result is re-validated against the typed groups, so a layer that
    /// sets a known key to the wrong type is rejected here rather than
    /// surfacing inside the separator.
    pub fn merged(&self, layers: &[&ParamLayer]) -> Result<Self, serde_json::Error> {
        let mut flat = self.to_layer()?;
        for layer in layers {
            for (key, value) in layer.iter() {
                flat.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(Value::Object(flat))
    }

    /// Flatten into a single JSON object.
    pub fn to_layer(&self) -> Result<ParamLayer, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(<serde_json::Error as serde::ser::Error>::custom(
                "tuning parameters did not serialize to an object",
            )),
        }
    }
}
