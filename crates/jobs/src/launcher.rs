//! Starting the trainer process.

use std::path::PathBuf;

use async_trait::async_trait;

use sculpt_core::layout::ProjectLayout;
use sculpt_core::training::TrainingParams;
use sculpt_pipeline::runner::{self, CommandSpec, RunningProcess};

use crate::config::render_training_config;
use crate::error::JobError;

/// Environment variable restricting the trainer to specific GPUs.
pub const GPU_SELECTION_ENV: &str = "CUDA_VISIBLE_DEVICES";

/// Prepares a project for training and spawns the trainer.
#[async_trait]
pub trait TrainingLauncher: Send + Sync {
    async fn launch(
        &self,
        layout: &ProjectLayout,
        params: &TrainingParams,
    ) -> Result<RunningProcess, JobError>;
}

/// Launches Neuralangelo's distributed training entry point from a local
/// checkout.
pub struct NeuralangeloLauncher {
    python_bin: String,
    neuralangelo_dir: PathBuf,
}

impl NeuralangeloLauncher {
    pub fn new(python_bin: impl Into<String>, neuralangelo_dir: impl Into<PathBuf>) -> Self {
        Self {
            python_bin: python_bin.into(),
            neuralangelo_dir: neuralangelo_dir.into(),
        }
    }

    /// Training command for an already rendered config.
    pub fn command(&self, layout: &ProjectLayout, params: &TrainingParams, config: PathBuf) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.python_bin)
            .args(["-m", "torch.distributed.run", "--nproc_per_node=1", "train.py"])
            .flag("--config", config)
            .flag("--logdir", layout.logs_dir())
            .arg("--show_pbar")
            .current_dir(&self.neuralangelo_dir)
            .in_own_process_group();
        if let Some(gpus) = &params.gpu_ids {
            spec = spec.env(GPU_SELECTION_ENV, gpus);
        }
        spec
    }
}

#[async_trait]
impl TrainingLauncher for NeuralangeloLauncher {
    async fn launch(
        &self,
        layout: &ProjectLayout,
        params: &TrainingParams,
    ) -> Result<RunningProcess, JobError> {
        for dir in [layout.checkpoints_dir(), layout.logs_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| JobError::Config(format!("{}: {e}", dir.display())))?;
        }
        let config = render_training_config(layout, params).await?;
        let spec = self.command(layout, params, config);
        Ok(runner::spawn(&spec)?)
    }
}
