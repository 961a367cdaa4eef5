//! Structure-from-motion pipeline built on the COLMAP command line.
//!
//! Sparse run: feature extraction, exhaustive matching, mapping,
//! undistortion. Dense run: patch-match stereo, then fusion into a single
//! point cloud.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use sculpt_core::job::JobState;
use sculpt_core::layout::ProjectLayout;
use sculpt_core::reconstruction::ReconstructionParams;
use sculpt_events::{Broadcaster, EventScope};

use crate::artifacts::resolve_reconstruction_dir;
use crate::error::PipelineError;
use crate::runner::{self, CommandSpec};
use crate::stage::Stage;
use crate::stats::{read_statistics, ReconstructionStats};
use crate::supervisor::{PipelineReport, PipelineSupervisor};

pub const FEATURE_EXTRACTION: &str = "feature_extractor";
pub const MATCHING: &str = "exhaustive_matcher";
pub const MAPPING: &str = "mapper";
pub const UNDISTORTION: &str = "image_undistorter";
pub const PATCH_MATCH: &str = "patch_match_stereo";
pub const FUSION: &str = "stereo_fusion";

/// Outcome of a full reconstruction run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionReport {
    pub output_path: PathBuf,
    pub statistics: Option<ReconstructionStats>,
    pub sparse: PipelineReport,
    pub dense: Option<PipelineReport>,
}

/// Drives the COLMAP binary for one deployment.
pub struct ColmapPipeline {
    colmap_bin: String,
    broadcaster: Arc<Broadcaster>,
}

impl ColmapPipeline {
    pub fn new(colmap_bin: impl Into<String>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            colmap_bin: colmap_bin.into(),
            broadcaster,
        }
    }

    fn colmap(&self, subcommand: &str) -> CommandSpec {
        CommandSpec::new(&self.colmap_bin).arg(subcommand)
    }

    /// The four sparse stages, in order.
    pub fn sparse_stages(&self, layout: &ProjectLayout, params: &ReconstructionParams) -> Vec<Stage> {
        let database = layout.database_path();
        let images = layout.images_dir();
        let sparse = layout.sparse_dir();
        let dense = layout.dense_dir();

        let extract = self
            .colmap(FEATURE_EXTRACTION)
            .flag("--database_path", &database)
            .flag("--image_path", &images)
            .flag("--ImageReader.camera_model", &params.camera_model)
            .flag("--SiftExtraction.use_gpu", "1");

        let matching = self
            .colmap(MATCHING)
            .flag("--database_path", &database)
            .flag("--SiftMatching.use_gpu", "1")
            .flag(
                "--SiftMatching.max_num_matches",
                params.quality_tier().max_num_matches().to_string(),
            );

        let mapping = self
            .colmap(MAPPING)
            .flag("--database_path", &database)
            .flag("--image_path", &images)
            .flag("--output_path", &sparse);

        let undistort_base = self.colmap(UNDISTORTION).flag("--image_path", &images);
        let sparse_for_undistort = sparse.clone();
        let dense_for_undistort = dense.clone();
        let undistort = Stage::deferred(UNDISTORTION, move || {
            let model = resolve_reconstruction_dir(&sparse_for_undistort)?;
            Ok(undistort_base
                .clone()
                .flag("--input_path", model)
                .flag("--output_path", &dense_for_undistort)
                .flag("--output_type", "COLMAP"))
        })
        .with_output(&dense);

        vec![
            Stage::new(FEATURE_EXTRACTION, extract).with_output(&database),
            Stage::new(MATCHING, matching),
            Stage::new(MAPPING, mapping),
            undistort,
        ]
    }

    /// The two dense stages, in order.
    pub fn dense_stages(&self, layout: &ProjectLayout) -> Vec<Stage> {
        let dense = layout.dense_dir();
        let fused = layout.fused_point_cloud();

        let patch_match = self
            .colmap(PATCH_MATCH)
            .flag("--workspace_path", &dense)
            .flag("--PatchMatchStereo.gpu_index", "0");

        let fusion = self
            .colmap(FUSION)
            .flag("--workspace_path", &dense)
            .flag("--output_path", &fused);

        vec![
            Stage::new(PATCH_MATCH, patch_match),
            Stage::new(FUSION, fusion).with_output(fused),
        ]
    }

    /// Run the sparse pipeline (and the dense one if requested), then read
    /// reconstruction statistics.
    ///
    /// Publishes a `running` status first and a terminal status last; on
    /// failure an error event names the stage.
    pub async fn process(
        &self,
        project: &str,
        layout: &ProjectLayout,
        params: &ReconstructionParams,
    ) -> Result<ReconstructionReport, PipelineError> {
        let supervisor =
            PipelineSupervisor::new(Arc::clone(&self.broadcaster), project, EventScope::Reconstruction);
        supervisor
            .publish_status(JobState::Running, "Reconstruction started", None)
            .await;

        match self.run_process(&supervisor, layout, params).await {
            Ok(report) => {
                let result = serde_json::to_value(&report).ok();
                supervisor
                    .publish_status(JobState::Completed, "Reconstruction completed", result)
                    .await;
                Ok(report)
            }
            Err(e) => {
                supervisor.publish_failure(&e).await;
                Err(e)
            }
        }
    }

    async fn run_process(
        &self,
        supervisor: &PipelineSupervisor,
        layout: &ProjectLayout,
        params: &ReconstructionParams,
    ) -> Result<ReconstructionReport, PipelineError> {
        let images = layout.images_dir();
        if !images.is_dir() {
            return Err(PipelineError::MissingArtifact(images.display().to_string()));
        }
        tokio::fs::create_dir_all(layout.sparse_dir()).await?;
        tokio::fs::create_dir_all(layout.dense_dir()).await?;

        let sparse = supervisor.run(&self.sparse_stages(layout, params)).await?;
        let statistics = read_statistics(&layout.sparse_dir()).await;

        let dense = if params.dense_reconstruction {
            Some(supervisor.run(&self.dense_stages(layout)).await?)
        } else {
            None
        };

        Ok(ReconstructionReport {
            output_path: layout.colmap_dir(),
            statistics,
            sparse,
            dense,
        })
    }

    /// Run only the dense stages against an existing undistorted workspace.
    pub async fn dense_reconstruction(
        &self,
        project: &str,
        layout: &ProjectLayout,
    ) -> Result<PipelineReport, PipelineError> {
        let supervisor =
            PipelineSupervisor::new(Arc::clone(&self.broadcaster), project, EventScope::Reconstruction);
        supervisor
            .publish_status(JobState::Running, "Dense reconstruction started", None)
            .await;

        let dense = layout.dense_dir();
        let result = if dense.is_dir() {
            supervisor.run(&self.dense_stages(layout)).await
        } else {
            Err(PipelineError::MissingArtifact(dense.display().to_string()))
        };

        match result {
            Ok(report) => {
                let value = serde_json::json!({
                    "point_cloud": layout.fused_point_cloud(),
                    "pipeline": &report,
                });
                supervisor
                    .publish_status(JobState::Completed, "Dense reconstruction completed", Some(value))
                    .await;
                Ok(report)
            }
            Err(e) => {
                supervisor.publish_failure(&e).await;
                Err(e)
            }
        }
    }

    /// `true` if the COLMAP binary runs and reports a version.
    pub async fn check_installation(&self) -> bool {
        runner::check_available(&CommandSpec::new(&self.colmap_bin).arg("--version")).await
    }
}
