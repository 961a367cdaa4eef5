//! Job lifecycle tests against scripted stand-ins for the trainer.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use sculpt_core::job::JobState;
use sculpt_core::layout::ProjectLayout;
use sculpt_core::training::TrainingParams;
use sculpt_events::{Broadcaster, EventKind, ProgressEvent, Subscription};
use sculpt_jobs::{JobError, JobRegistry, PipelineKind, TrainingLauncher};
use sculpt_pipeline::runner::{self, CommandSpec, RunningProcess};

const WAIT: Duration = Duration::from_secs(10);

/// Runs a fixed shell script instead of the trainer.
struct ScriptLauncher {
    script: String,
}

#[async_trait]
impl TrainingLauncher for ScriptLauncher {
    async fn launch(&self, _layout: &ProjectLayout, _params: &TrainingParams) -> Result<RunningProcess, JobError> {
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg(&self.script)
            .in_own_process_group();
        Ok(runner::spawn(&spec)?)
    }
}

/// A launcher whose trainer binary does not exist.
struct BrokenLauncher;

#[async_trait]
impl TrainingLauncher for BrokenLauncher {
    async fn launch(&self, _layout: &ProjectLayout, _params: &TrainingParams) -> Result<RunningProcess, JobError> {
        Ok(runner::spawn(&CommandSpec::new("/nonexistent/python"))?)
    }
}

struct Harness {
    registry: Arc<JobRegistry>,
    events: Subscription,
    _dir: tempfile::TempDir,
}

async fn harness_with(launcher: Arc<dyn TrainingLauncher>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let broadcaster = Arc::new(Broadcaster::new());
    let events = broadcaster.subscribe().await;
    let registry = JobRegistry::new(dir.path(), launcher, broadcaster)
        .with_stop_grace(Duration::from_millis(500));
    Harness {
        registry: Arc::new(registry),
        events,
        _dir: dir,
    }
}

async fn harness(script: &str) -> Harness {
    harness_with(Arc::new(ScriptLauncher {
        script: script.to_string(),
    }))
    .await
}

fn params() -> TrainingParams {
    TrainingParams::new("statue")
}

/// Wait for the first event satisfying `pred`.
async fn wait_for<F>(sub: &mut Subscription, mut pred: F) -> ProgressEvent
where
    F: FnMut(&ProgressEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = sub.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_status(event: &ProgressEvent, expected: JobState) -> bool {
    matches!(event.kind, EventKind::Status { state, .. } if state == expected)
}

/// Poll until the job reaches `state`.
async fn wait_for_state(registry: &JobRegistry, project: &str, state: JobState) {
    tokio::time::timeout(WAIT, async {
        while registry.status(project).state != state {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job did not reach the expected state");
}

// ---------------------------------------------------------------------------
// Test: output becomes progress and log events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_run_streams_progress_and_completes() {
    let mut h = harness("echo 'loading data'; echo 'iter: 1000, loss: 0.0234'; echo 'iter: 2000, loss: 0.0117'").await;

    let started = h.registry.start("statue", params()).await.unwrap();
    assert_eq!(started.state, JobState::Running);

    wait_for(&mut h.events, |e| is_status(e, JobState::Completed)).await;

    let status = h.registry.status("statue");
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.iteration, Some(2000));
    assert_eq!(status.loss, Some(0.0117));
    assert!(status.finished_at.is_some());
    assert_eq!(status.params, Some(params()));
}

#[tokio::test]
async fn every_line_is_logged_and_matches_become_progress() {
    let mut h = harness("echo 'starting worker pool'; echo 'iter: 1000, loss: 0.0234'").await;
    h.registry.start("statue", params()).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let event = wait_for(&mut h.events, |e| e.project.as_deref() == Some("statue")).await;
        let done = is_status(&event, JobState::Completed);
        seen.push(event);
        if done {
            break;
        }
    }

    let kinds: Vec<&str> = seen.iter().map(ProgressEvent::type_name).collect();
    assert_eq!(kinds, vec!["status", "log", "progress", "log", "status"]);
    assert_matches!(seen[2].kind, EventKind::Progress { iteration: 1000, .. });
}

#[tokio::test]
async fn non_zero_exit_is_errored_with_diagnostics() {
    let mut h = harness("echo 'iter: 10, loss: 1.5'; echo 'CUDA error: out of memory' >&2; exit 3").await;
    h.registry.start("statue", params()).await.unwrap();

    let error = wait_for(&mut h.events, |e| e.type_name() == "error").await;
    assert_matches!(&error.kind, EventKind::Error { message } if message.contains("out of memory"));
    wait_for(&mut h.events, |e| is_status(e, JobState::Errored)).await;

    let status = h.registry.status("statue");
    assert_eq!(status.state, JobState::Errored);
    assert!(status.error.unwrap().contains("exited with code 3"));
    assert_eq!(status.iteration, Some(10));
}

// ---------------------------------------------------------------------------
// Test: one active job per project
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_start_conflicts_and_leaves_first_untouched() {
    let h = harness("echo 'iter: 5, loss: 0.9'; sleep 30").await;

    let first = h.registry.start("statue", params()).await.unwrap();
    let second = h.registry.start("statue", params()).await;

    assert_matches!(second, Err(JobError::Conflict(project)) if project == "statue");
    let status = h.registry.status("statue");
    assert_eq!(status.state, JobState::Running);
    assert_eq!(status.started_at, first.started_at);

    h.registry.stop("statue").await.unwrap();
}

#[tokio::test]
async fn concurrent_starts_have_exactly_one_winner() {
    let h = harness("sleep 30").await;

    let (a, b) = tokio::join!(
        h.registry.start("statue", params()),
        h.registry.start("statue", params()),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(a, Err(JobError::Conflict(_))) || matches!(b, Err(JobError::Conflict(_))));

    h.registry.stop("statue").await.unwrap();
}

#[tokio::test]
async fn other_projects_are_independent() {
    let h = harness("sleep 30").await;

    h.registry.start("statue", params()).await.unwrap();
    h.registry.start("bust", params()).await.unwrap();

    assert_eq!(h.registry.status("statue").state, JobState::Running);
    assert_eq!(h.registry.status("bust").state, JobState::Running);
    h.registry.shutdown_all().await;
    assert_eq!(h.registry.status("statue").state, JobState::Stopped);
    assert_eq!(h.registry.status("bust").state, JobState::Stopped);
}

#[tokio::test]
async fn finished_job_can_be_restarted() {
    let mut h = harness("echo done").await;

    h.registry.start("statue", params()).await.unwrap();
    wait_for(&mut h.events, |e| is_status(e, JobState::Completed)).await;
    wait_for_state(&h.registry, "statue", JobState::Completed).await;

    let restarted = h.registry.start("statue", params()).await.unwrap();
    assert_eq!(restarted.state, JobState::Running);
}

// ---------------------------------------------------------------------------
// Test: pause / resume / stop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_and_resume_keep_progress() {
    let mut h = harness("echo 'iter: 100, loss: 0.5'; sleep 30").await;
    h.registry.start("statue", params()).await.unwrap();
    wait_for(&mut h.events, |e| e.type_name() == "progress").await;

    let paused = h.registry.pause("statue").await.unwrap();
    assert_eq!(paused.state, JobState::Paused);
    assert_eq!((paused.iteration, paused.loss), (Some(100), Some(0.5)));

    let resumed = h.registry.resume("statue").await.unwrap();
    assert_eq!(resumed.state, JobState::Running);
    assert_eq!((resumed.iteration, resumed.loss), (Some(100), Some(0.5)));

    h.registry.stop("statue").await.unwrap();
}

#[tokio::test]
async fn invalid_transitions_are_rejected() {
    let h = harness("sleep 30").await;

    assert_matches!(h.registry.pause("statue").await, Err(JobError::NotFound(_)));
    assert_eq!(h.registry.status("statue").state, JobState::Idle);

    h.registry.start("statue", params()).await.unwrap();
    assert_matches!(h.registry.resume("statue").await, Err(JobError::NotPaused(_)));

    h.registry.pause("statue").await.unwrap();
    assert_matches!(h.registry.pause("statue").await, Err(JobError::NotRunning(_)));

    h.registry.stop("statue").await.unwrap();
    assert_matches!(h.registry.pause("statue").await, Err(JobError::NotRunning(_)));
    assert_matches!(h.registry.resume("statue").await, Err(JobError::NotPaused(_)));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let mut h = harness("sleep 30").await;
    h.registry.start("statue", params()).await.unwrap();

    let first = h.registry.stop("statue").await.unwrap();
    let second = h.registry.stop("statue").await.unwrap();

    assert_eq!(first.state, JobState::Stopped);
    assert_eq!(second.state, JobState::Stopped);
    assert_eq!(first.finished_at, second.finished_at);
    wait_for(&mut h.events, |e| is_status(e, JobState::Stopped)).await;
}

#[tokio::test]
async fn paused_job_can_be_stopped() {
    let h = harness("sleep 30").await;
    h.registry.start("statue", params()).await.unwrap();
    h.registry.pause("statue").await.unwrap();

    let stopped = tokio::time::timeout(WAIT, h.registry.stop("statue")).await.unwrap().unwrap();

    assert_eq!(stopped.state, JobState::Stopped);
}

#[tokio::test]
async fn trainer_ignoring_sigterm_is_killed_after_grace() {
    let h = harness("trap '' TERM; sleep 30").await;
    h.registry.start("statue", params()).await.unwrap();
    // Give the shell time to install the trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    let stopped = h.registry.stop("statue").await.unwrap();

    assert_eq!(stopped.state, JobState::Stopped);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(started.elapsed() < WAIT);
}

#[tokio::test]
async fn stop_after_completion_reports_final_state() {
    let mut h = harness("true").await;
    h.registry.start("statue", params()).await.unwrap();
    wait_for(&mut h.events, |e| is_status(e, JobState::Completed)).await;
    wait_for_state(&h.registry, "statue", JobState::Completed).await;

    let status = h.registry.stop("statue").await.unwrap();

    assert_eq!(status.state, JobState::Completed);
}

// ---------------------------------------------------------------------------
// Test: launch failures and pipeline slots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn launch_failure_is_published_and_frees_the_slot() {
    let mut h = harness_with(Arc::new(BrokenLauncher)).await;

    let result = h.registry.start("statue", params()).await;

    assert_matches!(result, Err(JobError::Spawn(_)));
    wait_for(&mut h.events, |e| e.type_name() == "error").await;
    assert!(h.registry.begin_pipeline("statue", PipelineKind::Reconstruction).is_ok());
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_launch() {
    let h = harness("true").await;

    assert_matches!(h.registry.start("../etc", params()).await, Err(JobError::Invalid(_)));
    let bad = TrainingParams {
        learning_rate: 5.0,
        ..params()
    };
    assert_matches!(h.registry.start("statue", bad).await, Err(JobError::Invalid(_)));
}

#[tokio::test]
async fn pipeline_runs_hold_the_project_slot() {
    let h = harness("sleep 30").await;

    let guard = h.registry.begin_pipeline("statue", PipelineKind::Reconstruction).unwrap();
    assert_eq!(h.registry.active_pipeline("statue"), Some(PipelineKind::Reconstruction));
    assert_matches!(h.registry.start("statue", params()).await, Err(JobError::Conflict(_)));
    assert_matches!(
        h.registry.begin_pipeline("statue", PipelineKind::MeshExtraction),
        Err(JobError::Conflict(_))
    );

    drop(guard);
    assert_eq!(h.registry.active_pipeline("statue"), None);
    h.registry.start("statue", params()).await.unwrap();
    assert_matches!(
        h.registry.begin_pipeline("statue", PipelineKind::MeshExtraction),
        Err(JobError::Conflict(_))
    );

    h.registry.stop("statue").await.unwrap();
}
