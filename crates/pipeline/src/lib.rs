//! Supervised external-tool pipelines.
//!
//! - [`runner`]: spawn a process, stream its stdout, capture its stderr.
//! - [`supervisor`]: run ordered [`Stage`]s, abort on the first failure.
//! - [`colmap`]: the structure-from-motion stages.
//! - [`mesh`]: checkpoint-to-mesh extraction and post-processing.

pub mod artifacts;
pub mod colmap;
pub mod error;
pub mod mesh;
pub mod runner;
pub mod stage;
pub mod stats;
pub mod supervisor;

pub use colmap::{ColmapPipeline, ReconstructionReport};
pub use error::PipelineError;
pub use mesh::{CommandMeshToolkit, ExtractionReport, MeshExtractor, MeshToolkit};
pub use runner::{CommandSpec, RunnerError, RunningProcess};
pub use stage::Stage;
pub use stats::ReconstructionStats;
pub use supervisor::{PipelineReport, PipelineSupervisor, StageReport};
