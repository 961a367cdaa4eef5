//! Job-control signals delivered to trainer processes.

use crate::error::JobError;

/// The signals the controller sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Suspend execution (SIGSTOP).
    Pause,
    /// Continue a suspended process (SIGCONT).
    Resume,
    /// Ask the process to exit (SIGTERM).
    Terminate,
    /// Force the process to exit (SIGKILL).
    Kill,
}

impl ControlSignal {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pause => "SIGSTOP",
            Self::Resume => "SIGCONT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            Self::Pause => libc::SIGSTOP,
            Self::Resume => libc::SIGCONT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// Send `signal` to `pid`, or to the whole process group it leads.
///
/// Returns `Ok(false)` if the target no longer exists.
#[cfg(unix)]
pub fn send(pid: u32, signal: ControlSignal, process_group: bool) -> Result<bool, JobError> {
    let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
        return Err(JobError::Invalid(format!("pid {pid} out of range")));
    };
    let target = if process_group { -raw_pid } else { raw_pid };

    // Safety: kill(2) has no memory-safety preconditions.
    let ret = unsafe { libc::kill(target, signal.raw()) };
    if ret == 0 {
        tracing::debug!(pid, signal = signal.name(), process_group, "Signal delivered");
        return Ok(true);
    }

    let source = std::io::Error::last_os_error();
    if source.raw_os_error() == Some(libc::ESRCH) {
        return Ok(false);
    }
    Err(JobError::Signal {
        signal: signal.name(),
        pid,
        source,
    })
}

#[cfg(not(unix))]
pub fn send(_pid: u32, signal: ControlSignal, _process_group: bool) -> Result<bool, JobError> {
    Err(JobError::Unsupported(signal.name()))
}

/// Whether pause and resume can be honoured on this platform.
pub const fn supports_suspend() -> bool {
    cfg!(unix)
}
