//! Daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hard floor for restart-related intervals, in seconds.
///
/// Auto-restart intervals below this value are rejected at environment
/// check, and a fatal error never triggers a restart before the process
/// has been up at least this long.
pub const MIN_RESTART_SECS: u64 = 10;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Daemon name; used for log lines, the init script, and the default
    /// pid-file location.
    #[serde(default = "default_name")]
    pub name: String,

    /// Absolute path of the executable image used for self-restart.
    #[serde(default = "default_filename")]
    pub filename: PathBuf,

    /// Target wall time of one run-loop iteration, in seconds.
    /// Zero means "no sleep"; fractional values are allowed.
    #[serde(default = "default_loop_interval")]
    pub loop_interval_secs: f64,

    /// Scheduled self-replacement interval, in seconds.
    /// Must be at least [`MIN_RESTART_SECS`]; only effective when daemonized.
    #[serde(default = "default_auto_restart_interval")]
    pub auto_restart_interval_secs: u64,

    /// Whether to detach from the controlling terminal (daemon mode).
    #[serde(default)]
    pub daemonize: bool,

    /// Mirror log lines to stdout. Ignored when daemonized.
    #[serde(default)]
    pub verbose: bool,

    /// Path to the PID file. Content is this process's pid; removed on
    /// teardown only while still owned.
    #[serde(default)]
    pub pid_file: Option<PathBuf>,

    /// Path to the daemon log file. Opened lazily on first write.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Working directory after daemonizing.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Override arguments for the restart command line. When unset the
    /// replacement is spawned with the same daemon/pid-file flags.
    #[serde(default)]
    pub restart_args: Option<Vec<String>>,

    /// Maximum number of fatal-error restarts within the restart window.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Time window for counting fatal-error restarts (in seconds).
    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,
}

fn default_name() -> String {
    "vigild".to_string()
}

fn default_filename() -> PathBuf {
    std::env::current_exe().unwrap_or_default()
}

fn default_loop_interval() -> f64 {
    1.0
}

fn default_auto_restart_interval() -> u64 {
    86_400
}

fn default_max_restarts() -> u32 {
    10
}

fn default_restart_window() -> u64 {
    300
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            filename: default_filename(),
            loop_interval_secs: default_loop_interval(),
            auto_restart_interval_secs: default_auto_restart_interval(),
            daemonize: false,
            verbose: false,
            pid_file: None,
            log_file: None,
            work_dir: None,
            restart_args: None,
            max_restarts: default_max_restarts(),
            restart_window_secs: default_restart_window(),
        }
    }
}

impl DaemonConfig {
    /// Create a config with the given daemon name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Default pid-file path used by the generated init script.
    pub fn default_pid_path(&self) -> PathBuf {
        PathBuf::from(format!("/var/run/{}.pid", self.name))
    }

    /// Default log-file path, used when daemonizing without an explicit
    /// log file.
    pub fn default_log_path(&self) -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(format!(".{}", self.name)).join("daemon.log"))
            .unwrap_or_else(|| PathBuf::from(format!("/var/log/{}.log", self.name)))
    }

    /// Get the loop interval as a Duration.
    pub fn loop_interval(&self) -> Duration {
        if self.loop_interval_secs.is_finite() && self.loop_interval_secs > 0.0 {
            Duration::from_secs_f64(self.loop_interval_secs)
        } else {
            Duration::ZERO
        }
    }

    /// Get the auto-restart interval as a Duration.
    pub fn auto_restart_interval(&self) -> Duration {
        Duration::from_secs(self.auto_restart_interval_secs)
    }

    /// Get the restart window as a Duration.
    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    /// Validate the configuration, collecting every finding.
    ///
    /// Findings are aggregated into the composite environment-check report
    /// rather than failing one at a time.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("daemon name must not be empty".to_string());
        }

        if self.filename.as_os_str().is_empty() {
            errors.push("filename must be set to the executable image path".to_string());
        } else if !self.filename.is_absolute() {
            errors.push(format!(
                "filename must be an absolute path (got {})",
                self.filename.display()
            ));
        }

        if !self.loop_interval_secs.is_finite() || self.loop_interval_secs < 0.0 {
            errors.push(format!(
                "loop_interval_secs must be a non-negative number (got {})",
                self.loop_interval_secs
            ));
        }

        if self.auto_restart_interval_secs < MIN_RESTART_SECS {
            errors.push(format!(
                "auto_restart_interval_secs must be at least {MIN_RESTART_SECS} (got {})",
                self.auto_restart_interval_secs
            ));
        }

        if self.max_restarts == 0 {
            errors.push("max_restarts must be > 0".to_string());
        }

        if self.restart_window_secs == 0 {
            errors.push("restart_window_secs must be > 0".to_string());
        }

        if !cfg!(unix) {
            errors.push("process forking is not available on this host".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert!(!config.daemonize);
        assert_eq!(config.auto_restart_interval_secs, 86_400);
    }

    #[test]
    fn test_named() {
        let config = DaemonConfig::named("queue-runner");
        assert_eq!(config.name, "queue-runner");
        assert_eq!(
            config.default_pid_path(),
            PathBuf::from("/var/run/queue-runner.pid")
        );
    }

    #[test]
    fn test_default_log_path_is_per_daemon() {
        let config = DaemonConfig::named("queue-runner");
        let path = config.default_log_path();
        assert!(path.to_string_lossy().contains("queue-runner"));
        assert!(path.to_string_lossy().ends_with("daemon.log") || path.to_string_lossy().ends_with(".log"));
    }

    #[test]
    fn test_loop_interval_fractional() {
        let mut config = DaemonConfig::default();
        config.loop_interval_secs = 0.1;
        assert_eq!(config.loop_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_loop_interval_zero_means_no_sleep() {
        let mut config = DaemonConfig::default();
        config.loop_interval_secs = 0.0;
        assert_eq!(config.loop_interval(), Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_negative_interval() {
        let mut config = DaemonConfig::default();
        config.loop_interval_secs = -1.0;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("loop_interval_secs")));
    }

    #[test]
    fn test_validate_rejects_short_restart_interval() {
        let mut config = DaemonConfig::default();
        config.auto_restart_interval_secs = MIN_RESTART_SECS - 1;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("auto_restart_interval_secs")));
    }

    #[test]
    fn test_validate_rejects_relative_filename() {
        let mut config = DaemonConfig::default();
        config.filename = PathBuf::from("relative/bin");
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("absolute")));
    }

    #[test]
    fn test_validate_aggregates_findings() {
        let mut config = DaemonConfig::default();
        config.loop_interval_secs = f64::NAN;
        config.auto_restart_interval_secs = 0;
        let errors = config.validate();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = DaemonConfig::named("roundtrip");
        let json = serde_json::to_string(&config).unwrap();
        let back: DaemonConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "roundtrip");
        assert_eq!(back.auto_restart_interval_secs, config.auto_restart_interval_secs);
    }

    #[test]
    fn test_deserialization_defaults() {
        let json = r#"{"name": "partial"}"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "partial");
        assert_eq!(config.max_restarts, 10);
        assert!(config.pid_file.is_none());
    }
}
