//! Mesh extraction from trained checkpoints and mesh post-processing.
//!
//! Extraction runs the trainer's marching-cubes script as a single stage.
//! Clean-up, statistics and format conversion are delegated to a
//! [`MeshToolkit`], which by default is an external helper command that
//! reports its results as JSON on its last line of output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sculpt_core::job::JobState;
use sculpt_core::layout::ProjectLayout;
use sculpt_core::mesh::{ExportFormat, MeshExtractionParams, MeshStatistics, DEFAULT_SMOOTHING_ITERATIONS};
use sculpt_events::{Broadcaster, EventScope};

use crate::artifacts::find_checkpoint;
use crate::error::PipelineError;
use crate::runner::{self, CommandSpec};
use crate::stage::Stage;
use crate::supervisor::PipelineSupervisor;

/// Extraction script, relative to the trainer checkout.
pub const EXTRACT_MESH_SCRIPT: &str = "projects/neuralangelo/scripts/extract_mesh.py";

/// Stage name reported while the extraction script runs.
pub const EXTRACTION_STAGE: &str = "extract_mesh";

// ---------------------------------------------------------------------------
// Toolkit seam
// ---------------------------------------------------------------------------

/// What to do with a raw extracted mesh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshProcessRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// File stem for exported meshes (`<stem>.<ext>`).
    pub stem: String,
    pub formats: Vec<ExportFormat>,
    /// Keep the largest component, merge vertices, drop degenerate faces,
    /// smooth and fix normals.
    pub post_process: bool,
    pub smoothing_iterations: u32,
    pub target_faces: Option<u64>,
}

/// Files written and statistics computed by the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshProcessOutcome {
    pub files: Vec<PathBuf>,
    pub statistics: MeshStatistics,
}

/// Mesh clean-up and conversion.
#[async_trait]
pub trait MeshToolkit: Send + Sync {
    async fn process(&self, request: &MeshProcessRequest) -> Result<MeshProcessOutcome, PipelineError>;

    /// Reduce `mesh` to at most `target_faces` and return the new file,
    /// written next to the input as `<stem>_decimated.<ext>`.
    async fn decimate(&self, mesh: &Path, target_faces: u64) -> Result<PathBuf, PipelineError>;
}

/// [`MeshToolkit`] backed by an external helper program.
///
/// Invoked as `<program> process ...` or `<program> decimate ...`; the
/// helper prints a JSON report as its final stdout line.
pub struct CommandMeshToolkit {
    program: String,
}

#[derive(Deserialize)]
struct DecimateReport {
    output: PathBuf,
}

impl CommandMeshToolkit {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command line for a processing request.
    pub fn process_command(&self, request: &MeshProcessRequest) -> CommandSpec {
        let formats = request
            .formats
            .iter()
            .map(|f| f.extension())
            .collect::<Vec<_>>()
            .join(",");

        let mut spec = CommandSpec::new(&self.program)
            .arg("process")
            .flag("--input", &request.input)
            .flag("--output-dir", &request.output_dir)
            .flag("--stem", &request.stem)
            .flag("--formats", formats);
        if request.post_process {
            spec = spec
                .arg("--post-process")
                .flag("--smooth-iterations", request.smoothing_iterations.to_string());
        }
        if let Some(target) = request.target_faces {
            spec = spec.flag("--target-faces", target.to_string());
        }
        spec
    }

    async fn run_json<T: serde::de::DeserializeOwned>(&self, spec: &CommandSpec) -> Result<T, PipelineError> {
        let output = runner::run_to_completion(spec)
            .await
            .map_err(|e| PipelineError::Toolkit(e.to_string()))?;
        let last = output
            .stdout
            .iter()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| PipelineError::Toolkit(format!("{} produced no report", self.program)))?;
        serde_json::from_str(last)
            .map_err(|e| PipelineError::Toolkit(format!("unreadable report from {}: {e}", self.program)))
    }
}

#[async_trait]
impl MeshToolkit for CommandMeshToolkit {
    async fn process(&self, request: &MeshProcessRequest) -> Result<MeshProcessOutcome, PipelineError> {
        self.run_json(&self.process_command(request)).await
    }

    async fn decimate(&self, mesh: &Path, target_faces: u64) -> Result<PathBuf, PipelineError> {
        let spec = CommandSpec::new(&self.program)
            .arg("decimate")
            .flag("--input", mesh)
            .flag("--target-faces", target_faces.to_string());
        let report: DecimateReport = self.run_json(&spec).await?;
        Ok(report.output)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Outcome of one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub checkpoint: PathBuf,
    pub files: Vec<PathBuf>,
    pub statistics: MeshStatistics,
}

/// Turns a checkpoint into exported meshes.
pub struct MeshExtractor {
    python_bin: String,
    neuralangelo_dir: PathBuf,
    toolkit: Arc<dyn MeshToolkit>,
    broadcaster: Arc<Broadcaster>,
}

impl MeshExtractor {
    pub fn new(
        python_bin: impl Into<String>,
        neuralangelo_dir: impl Into<PathBuf>,
        toolkit: Arc<dyn MeshToolkit>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            python_bin: python_bin.into(),
            neuralangelo_dir: neuralangelo_dir.into(),
            toolkit,
            broadcaster,
        }
    }

    /// Extraction command writing the raw mesh to `output`.
    pub fn extraction_command(
        &self,
        layout: &ProjectLayout,
        checkpoint: &Path,
        output: &Path,
        params: &MeshExtractionParams,
    ) -> CommandSpec {
        CommandSpec::new(&self.python_bin)
            .arg(EXTRACT_MESH_SCRIPT)
            .flag("--config", layout.training_config_path())
            .flag("--checkpoint", checkpoint)
            .flag("--output_file", output)
            .flag("--resolution", params.resolution.to_string())
            .flag("--block_res", params.block_resolution.to_string())
            .flag("--threshold", params.threshold.to_string())
            .current_dir(&self.neuralangelo_dir)
    }

    /// Extract, post-process and export a mesh for `project`.
    pub async fn extract(
        &self,
        project: &str,
        layout: &ProjectLayout,
        params: &MeshExtractionParams,
    ) -> Result<ExtractionReport, PipelineError> {
        let supervisor =
            PipelineSupervisor::new(Arc::clone(&self.broadcaster), project, EventScope::Extraction);
        supervisor
            .publish_status(JobState::Running, "Mesh extraction started", None)
            .await;

        match self.run_extraction(&supervisor, layout, params).await {
            Ok(report) => {
                let result = serde_json::to_value(&report).ok();
                supervisor
                    .publish_status(JobState::Completed, "Mesh extraction completed", result)
                    .await;
                Ok(report)
            }
            Err(e) => {
                supervisor.publish_failure(&e).await;
                Err(e)
            }
        }
    }

    async fn run_extraction(
        &self,
        supervisor: &PipelineSupervisor,
        layout: &ProjectLayout,
        params: &MeshExtractionParams,
    ) -> Result<ExtractionReport, PipelineError> {
        let checkpoint = find_checkpoint(&layout.checkpoints_dir(), &params.checkpoint).await?;

        let meshes = layout.meshes_dir();
        tokio::fs::create_dir_all(&meshes).await?;

        let stem = format!("mesh_{}", params.checkpoint);
        let raw = meshes.join(format!("{stem}_raw.ply"));

        let stage = Stage::new(
            EXTRACTION_STAGE,
            self.extraction_command(layout, &checkpoint, &raw, params),
        )
        .with_output(&raw);
        supervisor.run(&[stage]).await?;

        let request = MeshProcessRequest {
            input: raw,
            output_dir: meshes,
            stem,
            formats: params.export_formats.clone(),
            post_process: params.post_process,
            smoothing_iterations: DEFAULT_SMOOTHING_ITERATIONS,
            target_faces: params.target_faces,
        };
        let outcome = self.toolkit.process(&request).await?;

        tracing::info!(
            project = supervisor.project(),
            checkpoint = %checkpoint.display(),
            vertices = outcome.statistics.vertices,
            faces = outcome.statistics.faces,
            "Mesh exported",
        );

        Ok(ExtractionReport {
            checkpoint,
            files: outcome.files,
            statistics: outcome.statistics,
        })
    }

    /// Decimate an existing mesh to at most `target_faces`.
    pub async fn decimate(&self, mesh: &Path, target_faces: u64) -> Result<PathBuf, PipelineError> {
        if !mesh.is_file() {
            return Err(PipelineError::MissingArtifact(mesh.display().to_string()));
        }
        self.toolkit.decimate(mesh, target_faces).await
    }
}
