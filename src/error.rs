//! Supervision errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::worker::WorkerError;

/// Errors that can occur while supervising a daemon process.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A daemon has already been constructed in this process.
    #[error("a daemon instance already exists in this process")]
    AlreadyConstructed,

    /// Environment check failed; all findings aggregated.
    #[error("environment check failed: {}", errors.join("; "))]
    Environment { errors: Vec<String> },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to write the PID file.
    #[error("failed to write PID file at {path}: {reason}")]
    PidFileWrite { path: PathBuf, reason: String },

    /// Failed to read the PID file.
    #[error("failed to read PID file at {path}: {reason}")]
    PidFileRead { path: PathBuf, reason: String },

    /// The singleton lock is held by another live instance.
    #[error("lock is held by another instance (pid {pid})")]
    LockHeld { pid: u32 },

    /// Failed to acquire or release the singleton lock.
    #[error("lock error: {0}")]
    Lock(String),

    /// A plugin failed during setup or teardown.
    #[error("plugin '{alias}' failed: {reason}")]
    Plugin { alias: String, reason: String },

    /// Failed to set up signal handlers.
    #[error("failed to set up signal handlers: {0}")]
    SignalSetup(String),

    /// Process fork failed.
    #[error("failed to fork process: {0}")]
    ForkFailed(String),

    /// The loop clock was stopped without being started.
    #[error("loop clock stopped without a prior start")]
    ClockNotStarted,

    /// A custom event name collides with a built-in event.
    #[error("event name '{name}' is reserved for a built-in event")]
    EventKeyReserved { name: String },

    /// Maximum restart count exceeded within the restart window.
    #[error("maximum restart count ({max}) exceeded")]
    MaxRestartsExceeded { max: u32 },

    /// Failed to spawn the replacement process during a restart.
    #[error("restart failed: {0}")]
    RestartFailed(String),

    /// Worker invocation error.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Application-defined error.
    #[error("{0}")]
    App(String),
}

impl DaemonError {
    /// Convenience constructor for application failures.
    pub fn app(msg: impl Into<String>) -> Self {
        DaemonError::App(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_error_joins_findings() {
        let err = DaemonError::Environment {
            errors: vec!["filename not set".to_string(), "bad interval".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("filename not set"));
        assert!(msg.contains("bad interval"));
    }

    #[test]
    fn test_lock_held_error() {
        let err = DaemonError::LockHeld { pid: 4242 };
        assert!(err.to_string().contains("4242"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let daemon_err: DaemonError = io_err.into();
        assert!(daemon_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_app_constructor() {
        let err = DaemonError::app("database gone");
        assert_eq!(err.to_string(), "database gone");
    }
}
