//! Lifecycle control for one training job.
//!
//! The controller never owns the process handle. The monitoring task owns
//! it; the controller keeps the pid for signalling and an exit
//! notification to wait on during `stop()`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use sculpt_core::job::JobState;
use sculpt_core::progress::TrainingProgress;
use sculpt_core::training::TrainingParams;
use sculpt_core::types::{ProjectId, Timestamp};
use sculpt_events::{Broadcaster, EventScope, ProgressEvent};
use sculpt_pipeline::RunningProcess;

use crate::error::JobError;
use crate::monitor;
use crate::signals::{self, ControlSignal};

/// Time given to a terminated trainer before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Time allowed for a killed process to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Point-in-time view of a job, as returned by every control call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub project: ProjectId,
    pub state: JobState,
    pub iteration: Option<u64>,
    pub loss: Option<f64>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error: Option<String>,
    pub params: Option<TrainingParams>,
}

impl JobSnapshot {
    /// Snapshot for a project that has never been trained.
    pub fn idle(project: impl Into<ProjectId>) -> Self {
        Self {
            project: project.into(),
            state: JobState::Idle,
            iteration: None,
            loss: None,
            started_at: None,
            finished_at: None,
            error: None,
            params: None,
        }
    }
}

#[derive(Debug)]
struct JobRecord {
    state: JobState,
    iteration: Option<u64>,
    loss: Option<f64>,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
    error: Option<String>,
    stop_requested: bool,
}

/// Controls a single launched training process.
pub struct JobController {
    project: ProjectId,
    params: TrainingParams,
    pid: u32,
    process_group: bool,
    record: Mutex<JobRecord>,
    exited: watch::Receiver<bool>,
    kill: CancellationToken,
    broadcaster: Arc<Broadcaster>,
    stop_grace: Duration,
}

impl JobController {
    /// Take ownership of a freshly spawned trainer: mark the job running,
    /// announce it and start monitoring its output.
    pub async fn start(
        project: impl Into<ProjectId>,
        params: TrainingParams,
        process: RunningProcess,
        broadcaster: Arc<Broadcaster>,
        stop_grace: Duration,
    ) -> Result<Arc<Self>, JobError> {
        let project = project.into();
        let pid = process
            .pid()
            .ok_or_else(|| JobError::NotRunning(project.clone()))?;
        let (exit_tx, exited) = watch::channel(false);

        let controller = Arc::new(Self::new(
            project,
            params,
            pid,
            process.leads_process_group(),
            exited,
            broadcaster,
            stop_grace,
        ));

        tracing::info!(project = %controller.project, pid, "Training started");
        controller
            .publish(ProgressEvent::status(EventScope::Training, controller.project.clone(), JobState::Running))
            .await;

        tokio::spawn(monitor::run(Arc::clone(&controller), process, exit_tx));
        Ok(controller)
    }

    fn new(
        project: ProjectId,
        params: TrainingParams,
        pid: u32,
        process_group: bool,
        exited: watch::Receiver<bool>,
        broadcaster: Arc<Broadcaster>,
        stop_grace: Duration,
    ) -> Self {
        Self {
            project,
            params,
            pid,
            process_group,
            record: Mutex::new(JobRecord {
                state: JobState::Running,
                iteration: None,
                loss: None,
                started_at: chrono::Utc::now(),
                finished_at: None,
                error: None,
                stop_requested: false,
            }),
            exited,
            kill: CancellationToken::new(),
            broadcaster,
            stop_grace,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> JobState {
        self.record().state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn status(&self) -> JobSnapshot {
        let record = self.record();
        self.snapshot_of(&record)
    }

    /// Suspend a running job.
    pub async fn pause(&self) -> Result<JobSnapshot, JobError> {
        let snapshot = {
            let mut record = self.record();
            if record.state != JobState::Running || record.stop_requested {
                return Err(JobError::NotRunning(self.project.clone()));
            }
            if !signals::send(self.pid, ControlSignal::Pause, self.process_group)? {
                return Err(JobError::NotRunning(self.project.clone()));
            }
            record.state = JobState::Paused;
            self.snapshot_of(&record)
        };

        tracing::info!(project = %self.project, pid = self.pid, "Training paused");
        self.publish(ProgressEvent::status(EventScope::Training, self.project.clone(), JobState::Paused))
            .await;
        Ok(snapshot)
    }

    /// Continue a paused job.
    pub async fn resume(&self) -> Result<JobSnapshot, JobError> {
        let snapshot = {
            let mut record = self.record();
            if record.state != JobState::Paused || record.stop_requested {
                return Err(JobError::NotPaused(self.project.clone()));
            }
            if !signals::send(self.pid, ControlSignal::Resume, self.process_group)? {
                return Err(JobError::NotRunning(self.project.clone()));
            }
            record.state = JobState::Running;
            self.snapshot_of(&record)
        };

        tracing::info!(project = %self.project, pid = self.pid, "Training resumed");
        self.publish(ProgressEvent::status(EventScope::Training, self.project.clone(), JobState::Running))
            .await;
        Ok(snapshot)
    }

    /// Stop the job: terminate, wait out the grace period, then kill.
    ///
    /// Calling it on a job that already ended returns its final status.
    pub async fn stop(&self) -> Result<JobSnapshot, JobError> {
        let already_stopping = {
            let mut record = self.record();
            if record.state.is_terminal() {
                return Ok(self.snapshot_of(&record));
            }
            std::mem::replace(&mut record.stop_requested, true)
        };
        if already_stopping {
            self.wait_for_exit(self.stop_grace + KILL_WAIT).await;
            return Ok(self.status());
        }

        tracing::info!(project = %self.project, pid = self.pid, "Stopping training");
        self.terminate().await;

        let snapshot = {
            let mut record = self.record();
            record.state = JobState::Stopped;
            record.finished_at.get_or_insert_with(chrono::Utc::now);
            self.snapshot_of(&record)
        };

        self.publish(
            ProgressEvent::status(EventScope::Training, self.project.clone(), JobState::Stopped)
                .with_message("Training stopped"),
        )
        .await;
        Ok(snapshot)
    }

    /// Wait until the monitoring task has reaped the process, up to
    /// `timeout`. Returns whether it did.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let mut exited = self.exited.clone();
        // A closed channel means the monitor is gone, which only happens
        // after the process was reaped.
        let reaped = tokio::time::timeout(timeout, exited.wait_for(|done| *done))
            .await
            .is_ok();
        reaped
    }

    #[cfg(unix)]
    async fn terminate(&self) {
        for signal in [ControlSignal::Resume, ControlSignal::Terminate] {
            if let Err(e) = signals::send(self.pid, signal, self.process_group) {
                tracing::warn!(project = %self.project, error = %e, "Signal failed");
            }
        }
        if self.wait_for_exit(self.stop_grace).await {
            return;
        }

        tracing::warn!(
            project = %self.project,
            grace_secs = self.stop_grace.as_secs(),
            "Trainer ignored SIGTERM, killing",
        );
        if let Err(e) = signals::send(self.pid, ControlSignal::Kill, self.process_group) {
            tracing::warn!(project = %self.project, error = %e, "Signal failed");
        }
        self.kill.cancel();
        if !self.wait_for_exit(KILL_WAIT).await {
            tracing::error!(project = %self.project, pid = self.pid, "Trainer did not exit after SIGKILL");
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&self) {
        self.kill.cancel();
        if !self.wait_for_exit(self.stop_grace + KILL_WAIT).await {
            tracing::error!(project = %self.project, pid = self.pid, "Trainer did not exit after kill");
        }
    }

    // ---- used by the monitoring task ----

    pub(crate) fn kill_token(&self) -> &CancellationToken {
        &self.kill
    }

    pub(crate) async fn record_progress(&self, sample: TrainingProgress) {
        {
            let mut record = self.record();
            record.iteration = Some(sample.iteration);
            record.loss = Some(sample.loss);
        }
        self.publish(ProgressEvent::progress(EventScope::Training, self.project.clone(), sample))
            .await;
    }

    pub(crate) async fn record_log(&self, line: String) {
        self.publish(ProgressEvent::log(EventScope::Training, self.project.clone(), line))
            .await;
    }

    /// Record how the process ended. `Err` carries the failure message.
    ///
    /// A stop in progress owns the terminal transition, so nothing is
    /// published in that case.
    pub(crate) async fn record_exit(&self, outcome: Result<(), String>) {
        let events = {
            let mut record = self.record();
            record.finished_at = Some(chrono::Utc::now());
            if record.stop_requested {
                record.state = JobState::Stopped;
                Vec::new()
            } else {
                match outcome {
                    Ok(()) => {
                        record.state = JobState::Completed;
                        vec![ProgressEvent::status(
                            EventScope::Training,
                            self.project.clone(),
                            JobState::Completed,
                        )
                        .with_message("Training completed")]
                    }
                    Err(message) => {
                        record.state = JobState::Errored;
                        record.error = Some(message.clone());
                        vec![
                            ProgressEvent::error(EventScope::Training, self.project.clone(), message.clone()),
                            ProgressEvent::status(EventScope::Training, self.project.clone(), JobState::Errored)
                                .with_message(message),
                        ]
                    }
                }
            }
        };

        for event in events {
            self.publish(event).await;
        }
    }

    // ---- private helpers ----

    fn record(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_of(&self, record: &JobRecord) -> JobSnapshot {
        JobSnapshot {
            project: self.project.clone(),
            state: record.state,
            iteration: record.iteration,
            loss: record.loss,
            started_at: Some(record.started_at),
            finished_at: record.finished_at,
            error: record.error.clone(),
            params: Some(self.params.clone()),
        }
    }

    async fn publish(&self, event: ProgressEvent) {
        self.broadcaster.publish(event).await;
    }
}
