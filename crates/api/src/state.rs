use std::sync::Arc;

use sculpt_events::Broadcaster;
use sculpt_jobs::{JobRegistry, NeuralangeloLauncher};
use sculpt_pipeline::{ColmapPipeline, CommandMeshToolkit, MeshExtractor};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Fan-out of progress events to WebSocket subscribers.
    pub broadcaster: Arc<Broadcaster>,
    /// Training jobs and pipeline slots, keyed by project.
    pub registry: Arc<JobRegistry>,
    /// Sparse/dense reconstruction driver.
    pub colmap: Arc<ColmapPipeline>,
    /// Mesh extraction and post-processing driver.
    pub extractor: Arc<MeshExtractor>,
}

impl AppState {
    /// Wire every component against the external tools named in `config`.
    pub fn from_config(config: ServerConfig) -> Self {
        let broadcaster = Arc::new(Broadcaster::new());

        let launcher = Arc::new(NeuralangeloLauncher::new(
            config.python_bin.clone(),
            config.neuralangelo_dir.clone(),
        ));
        let registry = JobRegistry::new(config.projects_dir.clone(), launcher, Arc::clone(&broadcaster))
            .with_stop_grace(config.stop_grace());

        let colmap = ColmapPipeline::new(config.colmap_bin.clone(), Arc::clone(&broadcaster));
        let extractor = MeshExtractor::new(
            config.python_bin.clone(),
            config.neuralangelo_dir.clone(),
            Arc::new(CommandMeshToolkit::new(config.mesh_tool_bin.clone())),
            Arc::clone(&broadcaster),
        );

        Self {
            config: Arc::new(config),
            broadcaster,
            registry: Arc::new(registry),
            colmap: Arc::new(colmap),
            extractor: Arc::new(extractor),
        }
    }
}
