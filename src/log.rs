//! The daemon's own log artifact.
//!
//! Separate from `tracing` diagnostics: an append-only text file the
//! operator can tail, opened lazily on the first write. A fixed header is
//! written whenever a fresh handle is opened and every line carries a
//! timestamp and the writing pid, so interleaved parent/child lines stay
//! attributable. When the file cannot be written, lines fall back to
//! stdout and the failure is reported once.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::warn;

const HEADER: &str = "Date                  PID      Message\n";

/// Append-only daemon log with stdout mirroring.
pub struct DaemonLog {
    path: Option<PathBuf>,
    file: Option<File>,
    verbose: bool,
    detached: bool,
    fallback_warned: bool,
}

impl DaemonLog {
    /// Create a log writing to `path` (or stdout-only when `None`),
    /// mirroring lines to stdout when `verbose`.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Self {
        Self {
            path,
            file: None,
            verbose,
            detached: false,
            fallback_warned: false,
        }
    }

    /// The configured log file path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Mark the process as detached from its terminal. Disables stdout
    /// mirroring regardless of verbosity.
    pub fn set_detached(&mut self) {
        self.detached = true;
    }

    /// Record an informational line.
    pub fn info(&mut self, msg: &str) {
        self.write_line(msg);
    }

    /// Record a warning line.
    pub fn warn(&mut self, msg: &str) {
        self.write_line(&format!("Warning: {msg}"));
    }

    /// Record an error line.
    pub fn error(&mut self, msg: &str) {
        self.write_line(&format!("Error: {msg}"));
    }

    fn write_line(&mut self, msg: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{stamp}] {:<8} {msg}", std::process::id());

        match self.write_to_file(&line) {
            Ok(true) => {
                if self.verbose && !self.detached {
                    println!("{line}");
                }
            }
            Ok(false) => {
                // No file configured: stdout is the log.
                println!("{line}");
            }
            Err(e) => {
                if !self.fallback_warned {
                    warn!("Daemon log unwritable, falling back to stdout: {e}");
                    self.fallback_warned = true;
                }
                println!("{line}");
            }
        }
    }

    /// Append the line to the log file. `Ok(false)` when no file is
    /// configured.
    fn write_to_file(&mut self, line: &str) -> std::io::Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        if self.file.is_none() {
            let mut file = OpenOptions::new().append(true).create(true).open(path)?;
            file.write_all(HEADER.as_bytes())?;
            self.file = Some(file);
        }

        let Some(file) = self.file.as_mut() else {
            return Ok(false);
        };
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
