//! External process execution.
//!
//! Every tool the backend drives (the SfM toolkit, the trainer, the mesh
//! extractor) runs as a child process through [`spawn`]. Standard output
//! is streamed line by line to the caller; standard error is collected in
//! the background so a failing exit can report its diagnostics.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Upper bound on retained stderr. Older output is discarded first.
pub const MAX_STDERR_BYTES: usize = 64 * 1024;

const STDERR_CHUNK: usize = 8 * 1024;

/// Errors raised while spawning or supervising a child process.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The executable could not be started (missing binary, permissions).
    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("'{program}' exited with code {exit_code:?}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Reading output or reaping the process failed.
    #[error("I/O error while supervising '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// A fully described invocation: program, arguments, working directory
/// and extra environment. Built up front so it can be logged and tested
/// without spawning anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    own_process_group: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            envs: Vec::new(),
            own_process_group: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `--flag value`.
    pub fn flag(self, flag: &str, value: impl Into<OsString>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Start the child as the leader of a new process group, so signals
    /// can be delivered to it and every process it forks.
    pub fn in_own_process_group(mut self) -> Self {
        self.own_process_group = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn uses_own_process_group(&self) -> bool {
        self.own_process_group
    }

    /// Whether `needle` appears among the arguments.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|v| v.to_string_lossy().into_owned())
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        #[cfg(unix)]
        if self.own_process_group {
            command.process_group(0);
        }
        command
    }
}

// ---------------------------------------------------------------------------
// ExitOutcome
// ---------------------------------------------------------------------------

/// How a reaped process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub program: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Tail of the captured standard error.
    pub stderr: String,
}

impl ExitOutcome {
    /// Convert an unsuccessful exit into [`RunnerError::CommandFailed`].
    pub fn into_result(self) -> Result<Self, RunnerError> {
        if self.success {
            Ok(self)
        } else {
            Err(RunnerError::CommandFailed {
                program: self.program,
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Output of [`run_to_completion`].
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<String>,
    pub outcome: ExitOutcome,
}

// ---------------------------------------------------------------------------
// RunningProcess
// ---------------------------------------------------------------------------

/// A spawned child whose stdout is being consumed by the caller.
///
/// The child is killed if this handle is dropped before [`wait`](Self::wait).
#[derive(Debug)]
pub struct RunningProcess {
    program: String,
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
    line_buf: Vec<u8>,
    process_group: bool,
}

impl RunningProcess {
    /// OS process id, or `None` once the child has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the child leads its own process group, in which case its
    /// pid doubles as the group id.
    pub fn leads_process_group(&self) -> bool {
        self.process_group
    }

    /// Read the next stdout line without its terminator.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Returns `Ok(None)`
    /// at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<String>, RunnerError> {
        let Some(reader) = self.stdout.as_mut() else {
            return Ok(None);
        };

        self.line_buf.clear();
        let read = reader
            .read_until(b'\n', &mut self.line_buf)
            .await
            .map_err(|source| RunnerError::Io {
                program: self.program.clone(),
                source,
            })?;
        if read == 0 {
            self.stdout = None;
            return Ok(None);
        }

        while matches!(self.line_buf.last(), Some(b'\n' | b'\r')) {
            self.line_buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.line_buf).into_owned()))
    }

    /// Drain any unread stdout, reap the process and report how it ended.
    pub async fn wait(mut self) -> Result<ExitOutcome, RunnerError> {
        while self.next_line().await?.is_some() {}

        let status = self.child.wait().await.map_err(|source| RunnerError::Io {
            program: self.program.clone(),
            source,
        })?;

        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        tracing::debug!(
            program = %self.program,
            exit_code = ?status.code(),
            success = status.success(),
            "Process exited",
        );

        Ok(ExitOutcome {
            program: self.program,
            exit_code: status.code(),
            success: status.success(),
            stderr,
        })
    }

    /// Forcefully kill the child and reap it.
    pub async fn kill(&mut self) -> Result<(), RunnerError> {
        self.child.kill().await.map_err(|source| RunnerError::Io {
            program: self.program.clone(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Spawn `spec` with stdin closed and both output streams captured.
///
/// Must be called from within a tokio runtime.
pub fn spawn(spec: &CommandSpec) -> Result<RunningProcess, RunnerError> {
    let mut command = spec.to_command();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| RunnerError::SpawnFailed {
        program: spec.program.clone(),
        source,
    })?;

    let stdout = child.stdout.take().map(BufReader::new);
    let stderr_task = child.stderr.take().map(|s| tokio::spawn(capture_stderr(s)));

    tracing::info!(
        command = %spec.display(),
        pid = ?child.id(),
        "Process spawned",
    );

    Ok(RunningProcess {
        program: spec.program.clone(),
        child,
        stdout,
        stderr_task,
        line_buf: Vec::new(),
        process_group: cfg!(unix) && spec.own_process_group,
    })
}

/// Run `spec` to exit, collecting stdout. Fails on a non-zero exit.
pub async fn run_to_completion(spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
    let mut process = spawn(spec)?;
    let mut stdout = Vec::new();
    while let Some(line) = process.next_line().await? {
        stdout.push(line);
    }
    let outcome = process.wait().await?.into_result()?;
    Ok(CommandOutput { stdout, outcome })
}

/// `true` if `spec` can be spawned and exits successfully.
pub async fn check_available(spec: &CommandSpec) -> bool {
    match run_to_completion(spec).await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(command = %spec.display(), error = %e, "Tool check failed");
            false
        }
    }
}

/// Read stderr to EOF, keeping only the last [`MAX_STDERR_BYTES`].
async fn capture_stderr(mut stderr: ChildStderr) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; STDERR_CHUNK];

    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > 2 * MAX_STDERR_BYTES {
                    let excess = tail.len() - MAX_STDERR_BYTES;
                    tail.drain(..excess);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading stderr");
                break;
            }
        }
    }

    if tail.len() > MAX_STDERR_BYTES {
        let excess = tail.len() - MAX_STDERR_BYTES;
        tail.drain(..excess);
    }
    String::from_utf8_lossy(&tail).into_owned()
}
