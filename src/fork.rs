//! Child process primitives.
//!
//! The low-level half of process parallelism: splitting the process and
//! reaping whatever children have exited. The supervisor-facing fork
//! operation (event dispatch, plugin-registry clearing, child body) lives
//! on [`DaemonContext`](crate::daemon::DaemonContext); workers and
//! one-shot tasks both funnel through the same non-blocking reap.

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, error};

use crate::error::DaemonError;

/// Exit status of a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// Child exited normally with the given code.
    Exited(i32),
    /// Child was killed by the given signal.
    Signaled(i32),
    /// Anything else (stopped, continued, ...).
    Unknown,
}

/// One reaped child process.
#[derive(Debug, Clone, Copy)]
pub struct ReapedChild {
    pub pid: u32,
    pub status: ChildStatus,
}

/// Split the current process.
///
/// Fork is unsafe in the presence of other threads holding locks; the
/// supervisor's single loop is the only caller and the child either runs
/// its body to completion or exits.
pub(crate) fn fork_process() -> Result<ForkResult, DaemonError> {
    unsafe { unistd::fork() }.map_err(|e| DaemonError::ForkFailed(e.to_string()))
}

/// Reap every child that has already exited, without blocking.
///
/// Called once per loop iteration so forked tasks and dead workers never
/// linger as zombies.
pub fn reap_children() -> Vec<ReapedChild> {
    let mut reaped = Vec::new();

    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(WaitStatus::Exited(pid, code)) => {
                debug!("Reaped child {} (exited {})", pid, code);
                reaped.push(ReapedChild {
                    pid: pid.as_raw() as u32,
                    status: ChildStatus::Exited(code),
                });
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                debug!("Reaped child {} (killed by {})", pid, sig);
                reaped.push(ReapedChild {
                    pid: pid.as_raw() as u32,
                    status: ChildStatus::Signaled(sig as i32),
                });
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::ECHILD) => break,
            Err(e) => {
                error!("waitpid error: {}", e);
                break;
            }
        }
    }

    reaped
}
