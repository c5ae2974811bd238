//! Orderly hand-off to a fresh process image.
//!
//! A restart replaces the running process with a newly spawned instance of
//! the same executable: the lock is released first so the replacement can
//! acquire, standard streams are pointed at the null device so the spawned
//! command inherits no blocked pipes, and the current process exits once
//! the replacement is underway. Fatal-error restarts additionally pass
//! through a sliding-window storm limiter.

use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::{DaemonConfig, MIN_RESTART_SECS};
use crate::error::DaemonError;

/// Pause before a fatal-error restart, giving transient external
/// resources a moment to recover.
pub(crate) const FATAL_RESTART_PAUSE: Duration = Duration::from_secs(2);

/// Whether the scheduled self-replacement is due.
///
/// Auto-restart only ever fires for a daemonized process whose configured
/// interval clears the hard floor.
pub(crate) fn auto_restart_due(daemonized: bool, interval_secs: u64, uptime: Duration) -> bool {
    daemonized && interval_secs >= MIN_RESTART_SECS && uptime.as_secs() >= interval_secs
}

/// Build the replacement command line: executable plus flags.
///
/// Without an override, the replacement is spawned detached with the same
/// pid-file flag, output discarded: `<filename> -d [-p <pid_file>]`.
pub fn restart_command(config: &DaemonConfig) -> (PathBuf, Vec<String>) {
    let args = match &config.restart_args {
        Some(args) => args.clone(),
        None => {
            let mut args = vec!["-d".to_string()];
            if let Some(pid_file) = &config.pid_file {
                args.push("-p".to_string());
                args.push(pid_file.display().to_string());
            }
            args
        }
    };

    (config.filename.clone(), args)
}

/// Point our stdout/stderr at the null device.
///
/// Descriptors 1 and 2 may be pipes held open by whoever launched us;
/// the replacement must not inherit them.
pub(crate) fn silence_std_streams() -> Result<(), DaemonError> {
    let dev_null = std::fs::OpenOptions::new().write(true).open("/dev/null")?;
    let fd = dev_null.as_raw_fd();

    nix::unistd::dup2(fd, 1).map_err(|e| DaemonError::RestartFailed(e.to_string()))?;
    nix::unistd::dup2(fd, 2).map_err(|e| DaemonError::RestartFailed(e.to_string()))?;
    Ok(())
}

/// Spawn the replacement instance, output discarded.
///
/// Returns the replacement's pid; the caller is expected to exit.
pub(crate) fn spawn_replacement(config: &DaemonConfig) -> Result<u32, DaemonError> {
    let (filename, args) = restart_command(config);

    let child = Command::new(&filename)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            DaemonError::RestartFailed(format!("spawning {}: {e}", filename.display()))
        })?;

    Ok(child.id())
}

/// Timestamps of recent fatal-error restarts.
///
/// A daemon that keeps dying right after start would otherwise respawn
/// itself forever; the fatal path compares the in-window count against
/// `DaemonConfig::max_restarts` before spawning a replacement.
#[derive(Default)]
pub(crate) struct RestartWindow {
    recent: Vec<Instant>,
}

impl RestartWindow {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a restart happening now and return how many restarts,
    /// including this one, fall inside `window`.
    pub(crate) fn record(&mut self, window: Duration) -> u32 {
        let now = Instant::now();
        self.recent.retain(|at| now.duration_since(*at) <= window);
        self.recent.push(now);
        self.recent.len() as u32
    }
}
