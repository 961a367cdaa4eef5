//! Per-job monitoring task.
//!
//! Consumes the trainer's stdout until end of stream, turning lines into
//! progress and log events, then reaps the process and records how it
//! ended. Nothing escapes this task: read and wait failures become an
//! errored job.

use std::sync::Arc;

use tokio::sync::watch;

use sculpt_core::progress::parse_progress_line;
use sculpt_pipeline::{RunnerError, RunningProcess};

use crate::controller::JobController;

pub(crate) async fn run(job: Arc<JobController>, mut process: RunningProcess, exit_tx: watch::Sender<bool>) {
    let streamed = consume_output(&job, &mut process).await;

    let outcome = match streamed {
        Ok(()) => match process.wait().await {
            Ok(exit) if exit.success => Ok(()),
            Ok(exit) => Err(failure_message(exit.exit_code, &exit.stderr)),
            Err(e) => Err(e.to_string()),
        },
        Err(e) => {
            tracing::error!(project = job.project(), error = %e, "Lost trainer output");
            if let Err(kill_err) = process.kill().await {
                tracing::warn!(project = job.project(), error = %kill_err, "Failed to kill trainer");
            }
            Err(e.to_string())
        }
    };

    match &outcome {
        Ok(()) => tracing::info!(project = job.project(), "Trainer exited"),
        Err(message) => tracing::warn!(project = job.project(), error = %message, "Trainer exited with failure"),
    }

    job.record_exit(outcome).await;
    exit_tx.send_replace(true);
}

async fn consume_output(job: &JobController, process: &mut RunningProcess) -> Result<(), RunnerError> {
    loop {
        let line = tokio::select! {
            _ = job.kill_token().cancelled() => {
                process.kill().await?;
                return Ok(());
            }
            line = process.next_line() => line?,
        };

        let Some(line) = line else {
            return Ok(());
        };

        tracing::debug!(project = job.project(), "{line}");
        if let Some(sample) = parse_progress_line(&line) {
            job.record_progress(sample).await;
        }
        job.record_log(line).await;
    }
}

fn failure_message(exit_code: Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    let status = match exit_code {
        Some(code) => format!("trainer exited with code {code}"),
        None => "trainer was terminated by a signal".to_string(),
    };
    if stderr.is_empty() {
        status
    } else {
        format!("{status}: {stderr}")
    }
}
