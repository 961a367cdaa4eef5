//! Tests for process spawning and output streaming.
#![cfg(unix)]

use assert_matches::assert_matches;
use sculpt_pipeline::runner::{self, CommandSpec, RunnerError};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script)
}

// ---------------------------------------------------------------------------
// Test: stdout is streamed line by line
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lines_arrive_in_order_without_terminators() {
    let mut process = runner::spawn(&sh("printf 'one\\ntwo\\r\\nthree'")).unwrap();
    assert!(process.pid().is_some());

    let mut lines = Vec::new();
    while let Some(line) = process.next_line().await.unwrap() {
        lines.push(line);
    }
    assert_eq!(lines, vec!["one", "two", "three"]);

    let outcome = process.wait().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn invalid_utf8_is_replaced_not_rejected() {
    let mut process = runner::spawn(&sh("printf 'ok \\377 end\\n'")).unwrap();

    let line = process.next_line().await.unwrap().unwrap();
    assert!(line.starts_with("ok "));
    assert!(line.ends_with(" end"));
    assert!(process.wait().await.unwrap().success);
}

// ---------------------------------------------------------------------------
// Test: failures carry diagnostics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_binary_is_a_spawn_failure() {
    let result = runner::spawn(&CommandSpec::new("/nonexistent/sculpt-tool"));

    assert_matches!(result, Err(RunnerError::SpawnFailed { program, .. }) if program == "/nonexistent/sculpt-tool");
}

#[tokio::test]
async fn non_zero_exit_reports_code_and_stderr() {
    let result = runner::run_to_completion(&sh("echo partial; echo 'database locked' >&2; exit 4")).await;

    assert_matches!(
        result,
        Err(RunnerError::CommandFailed { exit_code: Some(4), stderr, .. }) if stderr == "database locked"
    );
}

#[tokio::test]
async fn wait_drains_unread_output_and_reaps() {
    // More output than a pipe buffer holds; the caller reads nothing.
    let process = runner::spawn(&sh("i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done")).unwrap();

    let outcome = process.wait().await.unwrap();
    assert!(outcome.success);
}

// ---------------------------------------------------------------------------
// Test: working directory and environment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn working_dir_and_env_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let spec = sh("pwd; echo \"$CUDA_VISIBLE_DEVICES\"")
        .current_dir(dir.path())
        .env("CUDA_VISIBLE_DEVICES", "0,1");

    let output = runner::run_to_completion(&spec).await.unwrap();

    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(std::path::Path::new(&output.stdout[0]).canonicalize().unwrap(), expected);
    assert_eq!(output.stdout[1], "0,1");
}

#[tokio::test]
async fn check_available_reflects_exit_status() {
    assert!(runner::check_available(&sh("exit 0")).await);
    assert!(!runner::check_available(&sh("exit 1")).await);
    assert!(!runner::check_available(&CommandSpec::new("/nonexistent/colmap").arg("--version")).await);
}
