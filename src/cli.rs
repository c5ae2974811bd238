//! Command-line flag surface.
//!
//! Deliberately small: lifecycle actions (`-H`, `-i`, `-I`) and runtime
//! switches (`-d`, `-v`, `-p`). Application-specific flags belong to the
//! application's own parser; these compose on top of a [`DaemonConfig`].

use std::path::PathBuf;

use clap::Parser;

use crate::config::DaemonConfig;

/// Daemon control flags.
#[derive(Parser, Debug, Default)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct DaemonArgs {
    /// Print help and exit.
    #[arg(short = 'H')]
    pub help: bool,

    /// Print accumulated install instructions and exit.
    #[arg(short = 'i')]
    pub instructions: bool,

    /// Write an init script to /etc/init.d and exit.
    #[arg(short = 'I')]
    pub init_script: bool,

    /// Detach from the terminal and run as a daemon.
    #[arg(short = 'd')]
    pub daemonize: bool,

    /// Mirror log lines to stdout (ignored with -d).
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Write the current pid to this file.
    #[arg(short = 'p', value_name = "PATH")]
    pub pid_file: Option<PathBuf>,
}

impl DaemonArgs {
    /// Apply the runtime switches on top of a configuration.
    pub fn apply(self, mut config: DaemonConfig) -> DaemonConfig {
        if self.daemonize {
            config.daemonize = true;
        }
        // Verbose mirroring is meaningless once detached.
        if self.verbose && !config.daemonize {
            config.verbose = true;
        }
        if let Some(path) = self.pid_file {
            config.pid_file = Some(path);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DaemonArgs {
        DaemonArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_no_flags() {
        let args = parse(&["daemon"]);
        assert!(!args.help && !args.instructions && !args.init_script);
        assert!(!args.daemonize && !args.verbose);
        assert!(args.pid_file.is_none());
    }

    #[test]
    fn test_action_flags() {
        assert!(parse(&["daemon", "-H"]).help);
        assert!(parse(&["daemon", "-i"]).instructions);
        assert!(parse(&["daemon", "-I"]).init_script);
    }

    #[test]
    fn test_daemonize_with_pid_file() {
        let args = parse(&["daemon", "-d", "-p", "/tmp/x.pid"]);
        assert!(args.daemonize);
        assert_eq!(args.pid_file, Some(PathBuf::from("/tmp/x.pid")));
    }

    #[test]
    fn test_apply_sets_pid_file_and_daemonize() {
        let config = parse(&["daemon", "-d", "-p", "/tmp/x.pid"]).apply(DaemonConfig::default());
        assert!(config.daemonize);
        assert_eq!(config.pid_file, Some(PathBuf::from("/tmp/x.pid")));
    }

    #[test]
    fn test_verbose_ignored_when_daemonized() {
        let config = parse(&["daemon", "-d", "-v"]).apply(DaemonConfig::default());
        assert!(config.daemonize);
        assert!(!config.verbose);
    }

    #[test]
    fn test_verbose_in_foreground() {
        let config = parse(&["daemon", "-v"]).apply(DaemonConfig::default());
        assert!(config.verbose);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(DaemonArgs::try_parse_from(["daemon", "-x"]).is_err());
    }
}
