//! File-backed singleton lock.
//!
//! [`FileLock`] is the built-in [`LockPlugin`] backend: a pid file whose
//! content names the live holder. Acquisition probes the recorded process
//! for liveness, so a lock left behind by a crashed instance is taken over
//! instead of blocking startup forever.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::error::DaemonError;
use crate::pid::PidFile;
use crate::plugin::{LockPlugin, Plugin};

/// Check whether a process with the given pid exists.
fn process_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Pid-file based lock guaranteeing at most one live daemon per path.
pub struct FileLock {
    file: PidFile,
    held: bool,
}

impl FileLock {
    /// Create a lock bound to the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            file: PidFile::new(path),
            held: false,
        }
    }

    /// The lock file path.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Whether this instance holds the lock.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Pid of the current holder recorded in the file, tolerating a
    /// missing or garbled file.
    fn holder(&self) -> Option<u32> {
        self.file.read().ok().flatten()
    }
}

#[async_trait]
impl Plugin for FileLock {
    fn name(&self) -> &str {
        "file-lock"
    }

    fn check_environment(&self) -> Vec<String> {
        if self.file.path().as_os_str().is_empty() {
            return vec!["lock file path must not be empty".to_string()];
        }
        Vec::new()
    }

    async fn setup(&mut self) -> Result<(), DaemonError> {
        // The token is claimed in acquire(); nothing further to prepare.
        Ok(())
    }

    async fn teardown(&mut self) {
        if self.held {
            if let Err(e) = self.file.release() {
                warn!("Failed to release lock file: {e}");
            }
            self.held = false;
        }
    }
}

#[async_trait]
impl LockPlugin for FileLock {
    async fn acquire(&mut self) -> Result<(), DaemonError> {
        match self.file.read() {
            Ok(Some(pid)) if pid != std::process::id() && process_alive(pid) => {
                return Err(DaemonError::LockHeld { pid });
            }
            Ok(Some(pid)) if pid != std::process::id() => {
                warn!(
                    "Taking over stale lock {} (pid {pid} is gone)",
                    self.file.path().display()
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Overwriting unreadable lock {}: {e}",
                    self.file.path().display()
                );
            }
        }

        self.file
            .write()
            .map_err(|e| DaemonError::Lock(e.to_string()))?;
        self.held = true;
        info!("Lock acquired: {}", self.file.path().display());
        Ok(())
    }

    fn is_held_by_other(&self) -> bool {
        match self.holder() {
            Some(pid) => pid != std::process::id() && process_alive(pid),
            None => false,
        }
    }
}

/// Conventional lock path for a daemon name, next to its pid file.
pub fn default_lock_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/var/run/{name}.lock"))
}
