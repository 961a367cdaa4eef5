//! Rendering of the trainer's YAML configuration.
//!
//! Only the parameters exposed through [`TrainingParams`] vary; the rest
//! of the model, optimiser and schedule settings are fixed.

use std::path::{Path, PathBuf};

use serde::Serialize;

use sculpt_core::layout::ProjectLayout;
use sculpt_core::training::TrainingParams;

use crate::error::JobError;

/// Iterations between checkpoint writes.
pub const CHECKPOINT_SAVE_ITER: u64 = 10_000;

/// Upper bound of the hash-grid encoding resolution.
pub const ENCODING_MAX_RESOLUTION: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    pub name: String,
    pub arch: ArchConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub optim: OptimConfig,
    pub logging: LoggingConfig,
    pub trainer: TrainerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub latent_dim: u32,
    pub encoding: EncodingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub levels: u32,
    pub max_resolution: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub root: PathBuf,
    pub img_scale: f64,
    pub num_workers: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub surface: SurfaceConfig,
    pub object: ObjectConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceConfig {
    pub level_init: f64,
    pub isosurface: IsosurfaceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsosurfaceConfig {
    pub method: String,
    pub resolution: u32,
    pub chunk: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectConfig {
    pub sdf: SdfConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdfConfig {
    pub encoding: SdfEncodingConfig,
    pub gradient: GradientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdfEncodingConfig {
    pub coarse2fine: CoarseToFineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoarseToFineConfig {
    pub enabled: bool,
    pub init_active_level: u32,
    pub step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientConfig {
    pub mode: String,
    pub taps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub num_samples: SampleCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleCounts {
    pub coarse: u32,
    pub fine: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub lr: f64,
    pub sched: ScheduleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub warm_up_end: u64,
    pub two_steps: [u64; 2],
    pub gamma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub checkpoint_save_iter: u64,
    pub save_checkpoint: bool,
    pub checkpoint_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainerConfig {
    pub max_iter: u64,
    pub batch_size: u32,
    pub amp: bool,
}

impl TrainingConfig {
    /// Build the configuration for `params` rooted at `layout`.
    pub fn new(layout: &ProjectLayout, params: &TrainingParams) -> Self {
        Self {
            name: params.scene_name.clone(),
            arch: ArchConfig {
                kind: params.model_type.clone(),
                latent_dim: 256,
                encoding: EncodingConfig {
                    kind: "hashgrid".into(),
                    levels: params.hash_encoding_levels,
                    max_resolution: ENCODING_MAX_RESOLUTION,
                },
            },
            data: DataConfig {
                kind: "colmap".into(),
                root: layout.dense_dir(),
                img_scale: 1.0,
                num_workers: 4,
            },
            model: ModelConfig {
                surface: SurfaceConfig {
                    level_init: 0.5,
                    isosurface: IsosurfaceConfig {
                        method: "mt".into(),
                        resolution: params.resolution,
                        chunk: 1_000_000,
                    },
                },
                object: ObjectConfig {
                    sdf: SdfConfig {
                        encoding: SdfEncodingConfig {
                            coarse2fine: CoarseToFineConfig {
                                enabled: true,
                                init_active_level: 4,
                                step: 5000,
                            },
                        },
                        gradient: GradientConfig {
                            mode: "numerical".into(),
                            taps: 4,
                        },
                    },
                },
                render: RenderConfig {
                    kind: "volsdf".into(),
                    num_samples: SampleCounts { coarse: 64, fine: 16 },
                },
            },
            optim: OptimConfig {
                kind: "Adam".into(),
                lr: params.learning_rate,
                sched: ScheduleConfig {
                    kind: "two_steps_with_warmup".into(),
                    warm_up_end: 5000,
                    two_steps: [300_000, 400_000],
                    gamma: 0.33,
                },
            },
            logging: LoggingConfig {
                checkpoint_save_iter: CHECKPOINT_SAVE_ITER,
                save_checkpoint: true,
                checkpoint_path: layout.checkpoints_dir(),
            },
            trainer: TrainerConfig {
                max_iter: params.max_iter,
                batch_size: params.batch_size,
                amp: false,
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String, JobError> {
        serde_yaml::to_string(self).map_err(|e| JobError::Config(e.to_string()))
    }
}

/// Write the configuration for `params` into the project root and return
/// its path.
pub async fn render_training_config(
    layout: &ProjectLayout,
    params: &TrainingParams,
) -> Result<PathBuf, JobError> {
    let path = layout.training_config_path();
    let yaml = TrainingConfig::new(layout, params).to_yaml()?;
    write_config(&path, &yaml).await?;
    tracing::info!(path = %path.display(), scene = %params.scene_name, "Training config written");
    Ok(path)
}

async fn write_config(path: &Path, yaml: &str) -> Result<(), JobError> {
    tokio::fs::write(path, yaml)
        .await
        .map_err(|e| JobError::Config(format!("{}: {e}", path.display())))
}
