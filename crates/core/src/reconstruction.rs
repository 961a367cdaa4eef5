//! Structure-from-motion parameters: quality tiers, camera models and the
//! request body accepted when a reconstruction is started.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Quality tiers
// ---------------------------------------------------------------------------

/// Maximum feature matches per image pair for the high tier.
pub const MAX_MATCHES_HIGH: u32 = 32768;

/// Maximum feature matches per image pair for the medium tier.
pub const MAX_MATCHES_MEDIUM: u32 = 16384;

/// Maximum feature matches per image pair for the low tier.
pub const MAX_MATCHES_LOW: u32 = 8192;

/// Named matching preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    High,
    Medium,
    Low,
}

impl QualityTier {
    /// Resolve a tier by name. Unknown names fall back to [`QualityTier::High`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::High,
        }
    }

    /// `--SiftMatching.max_num_matches` value for this tier.
    pub fn max_num_matches(self) -> u32 {
        match self {
            Self::High => MAX_MATCHES_HIGH,
            Self::Medium => MAX_MATCHES_MEDIUM,
            Self::Low => MAX_MATCHES_LOW,
        }
    }
}

// ---------------------------------------------------------------------------
// Camera models
// ---------------------------------------------------------------------------

/// Camera models the feature extractor accepts.
pub const VALID_CAMERA_MODELS: &[&str] = &[
    "SIMPLE_PINHOLE",
    "PINHOLE",
    "SIMPLE_RADIAL",
    "RADIAL",
    "OPENCV",
];

/// Default camera model.
pub const DEFAULT_CAMERA_MODEL: &str = "PINHOLE";

/// Validate a camera model name against [`VALID_CAMERA_MODELS`].
pub fn validate_camera_model(model: &str) -> Result<(), String> {
    if VALID_CAMERA_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(format!(
            "camera_model must be one of {}, got '{model}'",
            VALID_CAMERA_MODELS.join(", ")
        ))
    }
}

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// Parameters for one reconstruction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionParams {
    #[serde(default = "default_camera_model")]
    pub camera_model: String,
    /// Quality tier name; unknown names are treated as `high`.
    #[serde(default = "default_quality")]
    pub quality: String,
    /// Run stereo matching and fusion after the sparse pipeline succeeds.
    #[serde(default)]
    pub dense_reconstruction: bool,
}

impl ReconstructionParams {
    /// Resolved quality tier.
    pub fn quality_tier(&self) -> QualityTier {
        QualityTier::from_name(&self.quality)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_camera_model(&self.camera_model)
    }
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            camera_model: default_camera_model(),
            quality: default_quality(),
            dense_reconstruction: false,
        }
    }
}

fn default_camera_model() -> String {
    DEFAULT_CAMERA_MODEL.to_string()
}

fn default_quality() -> String {
    "high".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_tier_uses_medium_table_value() {
        assert_eq!(QualityTier::from_name("medium").max_num_matches(), MAX_MATCHES_MEDIUM);
    }

    #[test]
    fn unknown_tier_falls_back_to_high() {
        assert_eq!(QualityTier::from_name("ultra"), QualityTier::High);
        assert_eq!(QualityTier::from_name("ultra").max_num_matches(), 32768);
        assert_eq!(QualityTier::from_name(""), QualityTier::High);
    }

    #[test]
    fn tier_names_are_case_insensitive() {
        assert_eq!(QualityTier::from_name("LOW"), QualityTier::Low);
        assert_eq!(QualityTier::from_name(" Medium "), QualityTier::Medium);
    }

    #[test]
    fn tiers_are_strictly_ordered() {
        assert!(MAX_MATCHES_HIGH > MAX_MATCHES_MEDIUM);
        assert!(MAX_MATCHES_MEDIUM > MAX_MATCHES_LOW);
    }

    #[test]
    fn camera_model_validation() {
        assert!(validate_camera_model("PINHOLE").is_ok());
        assert!(validate_camera_model("OPENCV").is_ok());
        assert!(validate_camera_model("pinhole").is_err());
        assert!(validate_camera_model("FISHEYE_9000").is_err());
    }

    #[test]
    fn params_defaults_from_empty_json() {
        let params: ReconstructionParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.camera_model, "PINHOLE");
        assert_eq!(params.quality_tier(), QualityTier::High);
        assert!(!params.dense_reconstruction);
        assert!(params.validate().is_ok());
    }
}
