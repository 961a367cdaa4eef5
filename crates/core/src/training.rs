//! Training run parameters.
//!
//! The parameter bag is snapshotted into the job record when a run starts
//! and rendered into the trainer's configuration file.

use serde::{Deserialize, Serialize};

/// Default number of training iterations.
pub const DEFAULT_MAX_ITER: u64 = 500_000;

/// Default isosurface resolution.
pub const DEFAULT_RESOLUTION: u32 = 1024;

/// Default number of hash-grid encoding levels.
pub const DEFAULT_ENCODING_LEVELS: u32 = 16;

/// Default optimizer learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Default batch size.
pub const DEFAULT_BATCH_SIZE: u32 = 4;

/// Parameters for a single training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub scene_name: String,
    #[serde(default = "default_max_iter")]
    pub max_iter: u64,
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default = "default_encoding_levels")]
    pub hash_encoding_levels: u32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Exported as `CUDA_VISIBLE_DEVICES` for the trainer process.
    #[serde(default)]
    pub gpu_ids: Option<String>,
}

impl TrainingParams {
    /// Parameters with every tunable at its default.
    pub fn new(scene_name: impl Into<String>) -> Self {
        Self {
            scene_name: scene_name.into(),
            max_iter: DEFAULT_MAX_ITER,
            resolution: DEFAULT_RESOLUTION,
            model_type: default_model_type(),
            hash_encoding_levels: DEFAULT_ENCODING_LEVELS,
            learning_rate: DEFAULT_LEARNING_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
            gpu_ids: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scene_name.trim().is_empty() {
            return Err("scene_name must not be empty".to_string());
        }
        if self.max_iter == 0 {
            return Err("max_iter must be positive".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }
        if self.resolution == 0 {
            return Err("resolution must be positive".to_string());
        }
        if self.hash_encoding_levels == 0 {
            return Err("hash_encoding_levels must be positive".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate < 1.0) {
            return Err(format!(
                "learning_rate must be in (0, 1), got {}",
                self.learning_rate
            ));
        }
        if let Some(ids) = &self.gpu_ids {
            let valid = !ids.is_empty()
                && ids.split(',').all(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()));
            if !valid {
                return Err(format!("gpu_ids must be a comma-separated list of indices, got '{ids}'"));
            }
        }
        Ok(())
    }
}

fn default_max_iter() -> u64 {
    DEFAULT_MAX_ITER
}

fn default_resolution() -> u32 {
    DEFAULT_RESOLUTION
}

fn default_model_type() -> String {
    "neuralangelo".to_string()
}

fn default_encoding_levels() -> u32 {
    DEFAULT_ENCODING_LEVELS
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}
