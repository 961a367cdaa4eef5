//! Job lifecycle states shared by the training controller, the pipeline
//! supervisor and the event stream.
//!
//! ```text
//! Idle -> Running -> { Paused, Completed, Stopped, Errored }
//! Paused -> { Running, Stopped }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a long-running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job has been started for the project.
    Idle,
    /// The external process is executing.
    Running,
    /// The external process is suspended; its memory is preserved.
    Paused,
    /// The process exited with a success status.
    Completed,
    /// The process was terminated on request.
    Stopped,
    /// The process failed or its monitor hit a fault.
    Errored,
}

impl JobState {
    /// Wire name of the state, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        }
    }

    /// `true` while a process is attached (running or suspended).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// `true` once the job can no longer change state on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Errored)
    }

    /// Whether a fresh job may be started over a job in this state.
    pub fn allows_start(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
