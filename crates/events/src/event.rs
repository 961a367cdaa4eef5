//! The progress event envelope streamed to subscribers.
//!
//! Every event is serialized as a flat JSON object with a `type` tag:
//!
//! ```json
//! {"scope":"training","project":"statue","type":"progress","iteration":1000,"loss":0.0234,"timestamp":"..."}
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sculpt_core::job::JobState;
use sculpt_core::progress::TrainingProgress;
use sculpt_core::types::{ProjectId, Timestamp};

// ---------------------------------------------------------------------------
// EventScope
// ---------------------------------------------------------------------------

/// Which kind of work produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    /// The long-running training job.
    Training,
    /// The structure-from-motion pipeline.
    Reconstruction,
    /// Mesh extraction and post-processing.
    Extraction,
    /// Channel-level events not tied to any project.
    System,
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Event payload, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A parsed training progress sample.
    Progress { iteration: u64, loss: f64 },

    /// A raw output line, forwarded verbatim.
    Log { message: String },

    /// The job or pipeline entered a new lifecycle state.
    Status {
        state: JobState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Structured result attached to terminal transitions (statistics,
        /// exported files).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },

    /// A pipeline stage is starting.
    Stage {
        stage: String,
        /// Zero-based position of the stage.
        index: usize,
        total: usize,
    },

    /// A failure surfaced to observers.
    Error { message: String },

    /// Channel liveness signal.
    Heartbeat,
}

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// An immutable notification about job or pipeline activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub scope: EventScope,

    /// Project the event belongs to; `None` for channel-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,

    #[serde(flatten)]
    pub kind: EventKind,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl ProgressEvent {
    /// Create an event for `project` stamped with the current time.
    pub fn new(scope: EventScope, project: impl Into<ProjectId>, kind: EventKind) -> Self {
        Self {
            scope,
            project: Some(project.into()),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(scope: EventScope, project: impl Into<ProjectId>, sample: TrainingProgress) -> Self {
        Self::new(
            scope,
            project,
            EventKind::Progress {
                iteration: sample.iteration,
                loss: sample.loss,
            },
        )
    }

    pub fn log(scope: EventScope, project: impl Into<ProjectId>, message: impl Into<String>) -> Self {
        Self::new(
            scope,
            project,
            EventKind::Log {
                message: message.into(),
            },
        )
    }

    pub fn status(scope: EventScope, project: impl Into<ProjectId>, state: JobState) -> Self {
        Self::new(
            scope,
            project,
            EventKind::Status {
                state,
                message: None,
                result: None,
            },
        )
    }

    pub fn stage(
        scope: EventScope,
        project: impl Into<ProjectId>,
        stage: impl Into<String>,
        index: usize,
        total: usize,
    ) -> Self {
        Self::new(
            scope,
            project,
            EventKind::Stage {
                stage: stage.into(),
                index,
                total,
            },
        )
    }

    pub fn error(scope: EventScope, project: impl Into<ProjectId>, message: impl Into<String>) -> Self {
        Self::new(
            scope,
            project,
            EventKind::Error {
                message: message.into(),
            },
        )
    }

    /// A channel-level liveness event with no project.
    pub fn heartbeat() -> Self {
        Self {
            scope: EventScope::System,
            project: None,
            kind: EventKind::Heartbeat,
            timestamp: Utc::now(),
        }
    }

    /// Attach a human-readable message to a `Status` event.
    ///
    /// No-op for other kinds.
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        if let EventKind::Status { message, .. } = &mut self.kind {
            *message = Some(text.into());
        }
        self
    }

    /// Attach a structured result to a `Status` event.
    ///
    /// No-op for other kinds.
    pub fn with_result(mut self, value: serde_json::Value) -> Self {
        if let EventKind::Status { result, .. } = &mut self.kind {
            *result = Some(value);
        }
        self
    }

    /// Wire name of the event kind (the JSON `type` tag).
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            EventKind::Progress { .. } => "progress",
            EventKind::Log { .. } => "log",
            EventKind::Status { .. } => "status",
            EventKind::Stage { .. } => "stage",
            EventKind::Error { .. } => "error",
            EventKind::Heartbeat => "heartbeat",
        }
    }

    /// `true` for status events that announce a terminal state, and for
    /// error events (which always accompany an errored job).
    pub fn is_terminal(&self) -> bool {
        match &self.kind {
            EventKind::Status { state, .. } => state.is_terminal(),
            EventKind::Error { .. } => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
