use sculpt_core::types::ProjectId;
use sculpt_pipeline::RunnerError;

/// Errors returned by job control calls.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Another job or pipeline is already active for the project.
    #[error("a job is already active for project '{0}'")]
    Conflict(ProjectId),

    #[error("no running job for project '{0}'")]
    NotRunning(ProjectId),

    #[error("job for project '{0}' is not paused")]
    NotPaused(ProjectId),

    #[error("no job has been started for project '{0}'")]
    NotFound(ProjectId),

    #[error("invalid request: {0}")]
    Invalid(String),

    /// The platform has no way to perform the operation.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("failed to send {signal} to process {pid}: {source}")]
    Signal {
        signal: &'static str,
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// The training configuration could not be rendered or written.
    #[error("failed to write training config: {0}")]
    Config(String),

    #[error("failed to launch trainer: {0}")]
    Spawn(#[from] RunnerError),
}
