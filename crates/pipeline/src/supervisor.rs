//! Sequential stage execution with progress reporting.
//!
//! Stages run strictly in declared order. The first failure aborts the
//! run: no later stage is started, and the error names the stage and
//! carries its captured diagnostics.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use sculpt_core::job::JobState;
use sculpt_core::types::ProjectId;
use sculpt_events::{Broadcaster, EventScope, ProgressEvent};

use crate::error::PipelineError;
use crate::runner;
use crate::stage::Stage;

/// Summary of one completed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    /// Number of stdout lines the stage produced.
    pub output_lines: usize,
}

/// Summary of a fully successful pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub duration_ms: u64,
}

/// Runs an ordered list of [`Stage`]s for one project and publishes stage
/// and log events as it goes.
pub struct PipelineSupervisor {
    broadcaster: Arc<Broadcaster>,
    project: ProjectId,
    scope: EventScope,
    forward_output: bool,
}

impl PipelineSupervisor {
    pub fn new(broadcaster: Arc<Broadcaster>, project: impl Into<ProjectId>, scope: EventScope) -> Self {
        Self {
            broadcaster,
            project: project.into(),
            scope,
            forward_output: true,
        }
    }

    /// Stop forwarding each stdout line as a log event. Lines are still
    /// traced at debug level.
    pub fn quiet(mut self) -> Self {
        self.forward_output = false;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Run every stage in order, stopping at the first failure.
    pub async fn run(&self, stages: &[Stage]) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let total = stages.len();
        let mut reports = Vec::with_capacity(total);

        for (index, stage) in stages.iter().enumerate() {
            tracing::info!(
                project = %self.project,
                stage = stage.name(),
                index,
                total,
                "Starting pipeline stage",
            );
            self.broadcaster
                .publish(ProgressEvent::stage(
                    self.scope,
                    self.project.clone(),
                    stage.name(),
                    index,
                    total,
                ))
                .await;

            match self.run_stage(stage).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(
                        project = %self.project,
                        stage = stage.name(),
                        error = %e,
                        "Pipeline stage failed",
                    );
                    return Err(e);
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(project = %self.project, stages = total, duration_ms, "Pipeline finished");

        Ok(PipelineReport {
            stages: reports,
            duration_ms,
        })
    }

    async fn run_stage(&self, stage: &Stage) -> Result<StageReport, PipelineError> {
        let spec = stage.command()?;
        let started = Instant::now();
        let stage_error = |source| PipelineError::Stage {
            stage: stage.name().to_string(),
            source,
        };

        let mut process = runner::spawn(&spec).map_err(stage_error)?;
        let mut output_lines = 0;

        while let Some(line) = process.next_line().await.map_err(stage_error)? {
            output_lines += 1;
            tracing::debug!(project = %self.project, stage = stage.name(), "{line}");
            if self.forward_output {
                self.broadcaster
                    .publish(ProgressEvent::log(self.scope, self.project.clone(), line))
                    .await;
            }
        }

        let outcome = process
            .wait()
            .await
            .and_then(|outcome| outcome.into_result())
            .map_err(stage_error)?;

        if let Some(missing) = stage.missing_output() {
            return Err(PipelineError::MissingArtifact(missing.display().to_string()));
        }

        Ok(StageReport {
            name: stage.name().to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            exit_code: outcome.exit_code,
            output_lines,
        })
    }

    /// Announce a lifecycle transition for this project.
    pub async fn publish_status(
        &self,
        state: JobState,
        message: impl Into<String>,
        result: Option<serde_json::Value>,
    ) {
        let mut event =
            ProgressEvent::status(self.scope, self.project.clone(), state).with_message(message);
        if let Some(value) = result {
            event = event.with_result(value);
        }
        self.broadcaster.publish(event).await;
    }

    /// Announce a failed run: an error event followed by an `errored` status.
    pub async fn publish_failure(&self, error: &PipelineError) {
        let message = error.to_string();
        self.broadcaster
            .publish(ProgressEvent::error(self.scope, self.project.clone(), message.clone()))
            .await;
        self.publish_status(JobState::Errored, message, None).await;
    }
}
