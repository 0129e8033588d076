//! Backend families and the stem topologies they produce.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire name of the MDX-Net family.
pub const MDX_ARCH_TYPE: &str = "MDX-Net";

/// Wire name of the Demucs family.
pub const DEMUCS_ARCH_TYPE: &str = "Demucs";

pub const VOCAL_STEM: &str = "Vocals";
pub const INST_STEM: &str = "Instrumental";

/// Demucs source names in model output order, per stem count.
const DEMUCS_2_SOURCES: &[&str] = &["vocals", "instrumental"];
const DEMUCS_4_SOURCES: &[&str] = &["drums", "bass", "other", "vocals"];
const DEMUCS_6_SOURCES: &[&str] = &["drums", "bass", "other", "vocals", "guitar", "piano"];

// ---------------------------------------------------------------------------
// BackendFamily
// ---------------------------------------------------------------------------

/// A processing architecture with its own parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendFamily {
    #[serde(rename = "MDX-Net")]
    Mdx,
    #[serde(rename = "Demucs")]
    Demucs,
}

impl BackendFamily {
    pub const ALL: [BackendFamily; 2] = [BackendFamily::Mdx, BackendFamily::Demucs];

    /// Parse the wire name. Returns `None` for unsupported families.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            MDX_ARCH_TYPE => Some(Self::Mdx),
            DEMUCS_ARCH_TYPE => Some(Self::Demucs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mdx => MDX_ARCH_TYPE,
            Self::Demucs => DEMUCS_ARCH_TYPE,
        }
    }

    /// Directory under the models root holding this family's artifacts.
    pub fn models_subdir(self) -> &'static str {
        match self {
            Self::Mdx => "MDX_Net_Models",
            Self::Demucs => "Demucs_Models",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The concrete separator implementation the processing capability runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorKind {
    Demucs,
    Mdx,
    MdxC,
}

// ---------------------------------------------------------------------------
// StemTopology
// ---------------------------------------------------------------------------

/// Number and names of the output channels a backend produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemTopology {
    pub stems: Vec<String>,
}

impl StemTopology {
    pub fn count(&self) -> usize {
        self.stems.len()
    }

    /// Primary/secondary pair used by two-stem MDX models.
    pub fn mdx(primary_stem: &str) -> Self {
        Self {
            stems: vec![primary_stem.to_string(), secondary_stem_for(primary_stem)],
        }
    }

    /// Demucs topology for a given stem count (2, 4 or 6).
    pub fn demucs(stem_count: u8) -> Self {
        let sources = match stem_count {
            6 => DEMUCS_6_SOURCES,
            4 => DEMUCS_4_SOURCES,
            _ => DEMUCS_2_SOURCES,
        };
        Self {
            stems: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Source name → channel index, as Demucs expects it.
    pub fn source_map(&self) -> BTreeMap<String, usize> {
        self.stems
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect()
    }
}

/// Derive the Demucs stem count from a topology marker in the model name.
///
/// `6s` wins over `4s`/`htdemucs`; anything else is a two-stem model.
pub fn demucs_stem_count_from_name(model_name: &str) -> u8 {
    if model_name.contains("6s") {
        6
    } else if model_name.contains("4s") || model_name.contains("htdemucs") {
        4
    } else {
        2
    }
}

/// Complement of an MDX primary stem.
pub fn secondary_stem_for(primary: &str) -> String {
    match primary {
        VOCAL_STEM => INST_STEM.to_string(),
        INST_STEM => VOCAL_STEM.to_string(),
        other => format!("No {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_names_round_trip() {
        for family in BackendFamily::ALL {
            assert_eq!(BackendFamily::from_name(family.name()), Some(family));
        }
        assert_eq!(BackendFamily::from_name("VR Arc"), None);
        assert_eq!(BackendFamily::from_name("mdx-net"), None);
    }

    #[test]
    fn family_serializes_with_wire_name() {
        assert_eq!(
            serde_json::to_value(BackendFamily::Mdx).unwrap(),
            serde_json::json!("MDX-Net")
        );
    }

    #[test]
    fn stem_count_markers() {
        assert_eq!(demucs_stem_count_from_name("htdemucs_6s"), 6);
        assert_eq!(demucs_stem_count_from_name("htdemucs_ft"), 4);
        assert_eq!(demucs_stem_count_from_name("hdemucs_mmi_4s"), 4);
        assert_eq!(demucs_stem_count_from_name("UVR_Demucs_Model_1"), 2);
    }

    #[test]
    fn demucs_topology_orders_sources() {
        let topology = StemTopology::demucs(6);
        assert_eq!(topology.count(), 6);
        let map = topology.source_map();
        assert_eq!(map["drums"], 0);
        assert_eq!(map["vocals"], 3);
        assert_eq!(map["piano"], 5);
    }

    #[test]
    fn mdx_topology_pairs_primary_with_complement() {
        assert_eq!(
            StemTopology::mdx(VOCAL_STEM).stems,
            vec!["Vocals".to_string(), "Instrumental".to_string()]
        );
        assert_eq!(
            StemTopology::mdx("Reverb").stems,
            vec!["Reverb".to_string(), "No Reverb".to_string()]
        );
    }
}
