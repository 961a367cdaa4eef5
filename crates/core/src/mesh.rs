//! Mesh extraction parameters and statistics.

use serde::{Deserialize, Serialize};

/// Checkpoint selector meaning "newest checkpoint on disk".
pub const LATEST_CHECKPOINT: &str = "latest";

/// Laplacian smoothing passes applied during post-processing.
pub const DEFAULT_SMOOTHING_ITERATIONS: u32 = 5;

/// Container formats the mesh toolkit can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Ply,
    Obj,
    Glb,
}

impl ExportFormat {
    /// File extension (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            Self::Ply => "ply",
            Self::Obj => "obj",
            Self::Glb => "glb",
        }
    }
}

/// Parameters for extracting a mesh from a trained checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshExtractionParams {
    /// `"latest"` or a checkpoint file stem.
    #[serde(default = "default_checkpoint")]
    pub checkpoint: String,
    /// Marching-cubes grid resolution.
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    /// Block resolution used to bound memory during extraction.
    #[serde(default = "default_block_resolution")]
    pub block_resolution: u32,
    /// Isosurface threshold.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_export_formats")]
    pub export_formats: Vec<ExportFormat>,
    #[serde(default = "default_post_process")]
    pub post_process: bool,
    /// Decimate the exported mesh to at most this many faces.
    #[serde(default)]
    pub target_faces: Option<u64>,
}

impl MeshExtractionParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.checkpoint.is_empty()
            || self.checkpoint.contains('/')
            || self.checkpoint.contains('\\')
            || self.checkpoint.starts_with('.')
        {
            return Err(format!("invalid checkpoint selector '{}'", self.checkpoint));
        }
        if self.resolution == 0 || self.block_resolution == 0 {
            return Err("resolution and block_resolution must be positive".to_string());
        }
        if self.export_formats.is_empty() {
            return Err("at least one export format is required".to_string());
        }
        if self.target_faces == Some(0) {
            return Err("target_faces must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for MeshExtractionParams {
    fn default() -> Self {
        Self {
            checkpoint: default_checkpoint(),
            resolution: default_resolution(),
            block_resolution: default_block_resolution(),
            threshold: default_threshold(),
            export_formats: default_export_formats(),
            post_process: default_post_process(),
            target_faces: None,
        }
    }
}

/// Geometry statistics reported by the mesh toolkit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshStatistics {
    pub vertices: u64,
    pub faces: u64,
    pub is_watertight: bool,
    /// Only meaningful for watertight meshes.
    pub volume: Option<f64>,
    pub area: f64,
    #[serde(default)]
    pub bounds: Option<[[f64; 3]; 2]>,
}

fn default_checkpoint() -> String {
    LATEST_CHECKPOINT.to_string()
}

fn default_resolution() -> u32 {
    2048
}

fn default_block_resolution() -> u32 {
    128
}

fn default_threshold() -> f64 {
    0.005
}

fn default_export_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Ply, ExportFormat::Obj]
}

fn default_post_process() -> bool {
    true
}
