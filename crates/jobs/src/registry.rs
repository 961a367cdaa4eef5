//! Project-keyed table of training jobs and pipeline runs.
//!
//! Enforces the one-active-job-per-project rule. The check and the
//! reservation happen under a single lock, so concurrent starts for the
//! same project produce exactly one winner. The lock is never held
//! across an `.await`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sculpt_core::layout::ProjectLayout;
use sculpt_core::training::TrainingParams;
use sculpt_core::types::ProjectId;
use sculpt_events::{Broadcaster, EventScope, ProgressEvent};

use crate::controller::{JobController, JobSnapshot, DEFAULT_STOP_GRACE};
use crate::error::JobError;
use crate::launcher::TrainingLauncher;

/// Kind of non-training work occupying a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Reconstruction,
    DenseReconstruction,
    MeshExtraction,
}

impl PipelineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reconstruction => "reconstruction",
            Self::DenseReconstruction => "dense_reconstruction",
            Self::MeshExtraction => "mesh_extraction",
        }
    }
}

#[derive(Default)]
struct Slots {
    /// Latest training job per project, active or terminal.
    jobs: HashMap<ProjectId, Arc<JobController>>,
    /// Projects whose trainer is being launched.
    launching: HashSet<ProjectId>,
    /// Projects with a pipeline run in flight.
    pipelines: HashMap<ProjectId, PipelineKind>,
}

impl Slots {
    fn is_busy(&self, project: &str) -> bool {
        self.launching.contains(project)
            || self.pipelines.contains_key(project)
            || self.jobs.get(project).is_some_and(|job| job.is_active())
    }
}

type SharedSlots = Arc<Mutex<Slots>>;

fn lock(slots: &SharedSlots) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a project's slot for the duration of a pipeline run. Dropping
/// it frees the slot.
#[must_use = "the project slot is released when the guard is dropped"]
pub struct PipelineGuard {
    slots: SharedSlots,
    project: ProjectId,
    kind: PipelineKind,
}

impl std::fmt::Debug for PipelineGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGuard")
            .field("project", &self.project)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PipelineGuard {
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        lock(&self.slots).pipelines.remove(&self.project);
        tracing::debug!(project = %self.project, kind = self.kind.as_str(), "Pipeline slot released");
    }
}

/// Removes a launch reservation unless the launch completed.
struct LaunchReservation {
    slots: SharedSlots,
    project: ProjectId,
}

impl Drop for LaunchReservation {
    fn drop(&mut self) {
        lock(&self.slots).launching.remove(&self.project);
    }
}

/// Owns every job in the process. Lives in application state.
pub struct JobRegistry {
    slots: SharedSlots,
    projects_dir: PathBuf,
    launcher: Arc<dyn TrainingLauncher>,
    broadcaster: Arc<Broadcaster>,
    stop_grace: Duration,
}

impl JobRegistry {
    pub fn new(
        projects_dir: impl Into<PathBuf>,
        launcher: Arc<dyn TrainingLauncher>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            slots: SharedSlots::default(),
            projects_dir: projects_dir.into(),
            launcher,
            broadcaster,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Override the SIGTERM grace period used by `stop()`.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Validated layout for `project`.
    pub fn layout(&self, project: &str) -> Result<ProjectLayout, JobError> {
        ProjectLayout::new(&self.projects_dir, project).map_err(|e| JobError::Invalid(e.to_string()))
    }

    /// Start training `project`.
    ///
    /// Fails with [`JobError::Conflict`] if the project already has an
    /// active job or pipeline run; the existing work is left untouched.
    pub async fn start(&self, project: &str, params: TrainingParams) -> Result<JobSnapshot, JobError> {
        params.validate().map_err(JobError::Invalid)?;
        let layout = self.layout(project)?;

        let reservation = {
            let mut slots = lock(&self.slots);
            if slots.is_busy(project) {
                return Err(JobError::Conflict(project.to_string()));
            }
            slots.launching.insert(project.to_string());
            LaunchReservation {
                slots: Arc::clone(&self.slots),
                project: project.to_string(),
            }
        };

        let process = match self.launcher.launch(&layout, &params).await {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(project, error = %e, "Failed to start training");
                self.broadcaster
                    .publish(ProgressEvent::error(EventScope::Training, project, e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let controller = JobController::start(
            project,
            params,
            process,
            Arc::clone(&self.broadcaster),
            self.stop_grace,
        )
        .await?;

        {
            let mut slots = lock(&self.slots);
            slots.jobs.insert(project.to_string(), Arc::clone(&controller));
            slots.launching.remove(project);
        }
        drop(reservation);

        Ok(controller.status())
    }

    pub async fn pause(&self, project: &str) -> Result<JobSnapshot, JobError> {
        self.job(project)?.pause().await
    }

    pub async fn resume(&self, project: &str) -> Result<JobSnapshot, JobError> {
        self.job(project)?.resume().await
    }

    pub async fn stop(&self, project: &str) -> Result<JobSnapshot, JobError> {
        self.job(project)?.stop().await
    }

    /// Current training status; `idle` for projects never trained.
    pub fn status(&self, project: &str) -> JobSnapshot {
        match lock(&self.slots).jobs.get(project) {
            Some(job) => job.status(),
            None => JobSnapshot::idle(project),
        }
    }

    /// Claim `project` for a pipeline run.
    pub fn begin_pipeline(&self, project: &str, kind: PipelineKind) -> Result<PipelineGuard, JobError> {
        let mut slots = lock(&self.slots);
        if slots.is_busy(project) {
            return Err(JobError::Conflict(project.to_string()));
        }
        slots.pipelines.insert(project.to_string(), kind);
        tracing::debug!(project, kind = kind.as_str(), "Pipeline slot claimed");
        Ok(PipelineGuard {
            slots: Arc::clone(&self.slots),
            project: project.to_string(),
            kind,
        })
    }

    /// The pipeline currently running for `project`, if any.
    pub fn active_pipeline(&self, project: &str) -> Option<PipelineKind> {
        lock(&self.slots).pipelines.get(project).copied()
    }

    /// Stop every active training job. Used during shutdown.
    pub async fn shutdown_all(&self) {
        let active: Vec<Arc<JobController>> = lock(&self.slots)
            .jobs
            .values()
            .filter(|job| job.is_active())
            .cloned()
            .collect();

        if active.is_empty() {
            return;
        }
        tracing::info!(count = active.len(), "Stopping active training jobs");

        let results = futures::future::join_all(active.iter().map(|job| job.stop())).await;
        for (job, result) in active.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!(project = job.project(), error = %e, "Failed to stop job during shutdown");
            }
        }
    }

    fn job(&self, project: &str) -> Result<Arc<JobController>, JobError> {
        lock(&self.slots)
            .jobs
            .get(project)
            .cloned()
            .ok_or_else(|| JobError::NotFound(project.to_string()))
    }
}
