//! PID file management.
//!
//! The PID file is owned by the process whose pid matches its contents;
//! only that process may remove it. A file that was overwritten by a
//! replacement instance is left untouched on teardown.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::DaemonError;

/// PID file bound to the lifetime of the running process.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    written: bool,
}

impl PidFile {
    /// Create a PID file manager for the given path. Nothing is written
    /// until [`write`](Self::write) is called.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            written: false,
        }
    }

    /// Get the PID file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the pid recorded in the file, if any.
    pub fn read(&self) -> Result<Option<u32>, DaemonError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.path).map_err(|e| DaemonError::PidFileRead {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| DaemonError::PidFileRead {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let pid = contents
            .trim()
            .parse::<u32>()
            .map_err(|e| DaemonError::PidFileRead {
                path: self.path.clone(),
                reason: format!("invalid pid content: {}", e),
            })?;

        Ok(Some(pid))
    }

    /// Write the current process pid to the file, creating parent
    /// directories as needed.
    ///
    /// Called again after a daemonizing fork to refresh the recorded pid.
    pub fn write(&mut self) -> Result<(), DaemonError> {
        let pid = std::process::id();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| DaemonError::PidFileWrite {
                path: self.path.clone(),
                reason: format!("failed to create parent directory: {}", e),
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| DaemonError::PidFileWrite {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        write!(file, "{}", pid).map_err(|e| DaemonError::PidFileWrite {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        self.written = true;
        debug!("PID file written: {} (pid {})", self.path.display(), pid);
        Ok(())
    }

    /// Whether this process currently owns the file: the recorded pid
    /// equals our own.
    pub fn is_owned(&self) -> bool {
        matches!(self.read(), Ok(Some(pid)) if pid == std::process::id())
    }

    /// Remove the file if, and only if, this process still owns it.
    ///
    /// Returns `true` when the file was removed. A file whose content no
    /// longer matches our pid has been taken over and is left in place.
    pub fn release(&mut self) -> Result<bool, DaemonError> {
        if !self.path.exists() {
            self.written = false;
            return Ok(false);
        }

        if !self.is_owned() {
            debug!(
                "PID file {} no longer owned by pid {}; leaving in place",
                self.path.display(),
                std::process::id()
            );
            return Ok(false);
        }

        fs::remove_file(&self.path).map_err(|e| DaemonError::PidFileWrite {
            path: self.path.clone(),
            reason: format!("failed to remove: {}", e),
        })?;

        self.written = false;
        debug!("PID file removed: {}", self.path.display());
        Ok(true)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if self.written {
            if let Err(e) = self.release() {
                warn!("Failed to release PID file on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "pid_tests.rs"]
mod tests;
