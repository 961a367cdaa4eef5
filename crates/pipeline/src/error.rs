use crate::runner::RunnerError;

/// Errors raised while running a multi-stage pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage's process could not be spawned or exited unsuccessfully.
    /// Fatal to the pipeline; later stages never run.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: RunnerError,
    },

    /// An intermediate output a stage depends on is absent.
    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    /// The requested checkpoint does not exist.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// The mesh toolkit failed or returned an unreadable report.
    #[error("mesh toolkit error: {0}")]
    Toolkit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Name of the failing stage, if the failure came from a stage.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Captured stderr of the failing stage, if it ran to a non-zero exit.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Stage {
                source: RunnerError::CommandFailed { stderr, .. },
                ..
            } => Some(stderr),
            _ => None,
        }
    }
}
