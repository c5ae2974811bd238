//! Operator-facing installation surface: help text, install
//! instructions, and the generated init script.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::config::DaemonConfig;
use crate::error::DaemonError;

/// Usage text printed by `-H`.
pub fn help_text(config: &DaemonConfig) -> String {
    format!(
        r#"usage: {name} [-H] [-i] [-I] [-d [-p PID_FILE]] [-v]

  -H           print this help and exit
  -i           print install instructions and exit
  -I           write an init script to /etc/init.d/{name} and exit
  -d           detach and run as a daemon
  -v           mirror log lines to stdout (ignored with -d)
  -p PID_FILE  write the current pid to PID_FILE
"#,
        name = config.name
    )
}

/// Accumulated install instructions printed by `-i`: the generic steps
/// plus whatever the application contributes.
pub fn install_instructions(config: &DaemonConfig, app_lines: &[String]) -> String {
    let mut lines = vec![
        format!(
            "Install {} to a stable location, e.g. /usr/local/bin/{}",
            config.filename.display(),
            config.name
        ),
        format!(
            "Run `{} -I` as root to install the init script",
            config.name
        ),
        format!(
            "Start with `/etc/init.d/{} start`; logs append to {}",
            config.name,
            config
                .log_file
                .clone()
                .unwrap_or_else(|| config.default_log_path())
                .display()
        ),
    ];
    lines.extend(app_lines.iter().cloned());

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{}. {line}\n", i + 1));
    }
    out
}

/// Render the init script: start/stop/restart/status around the daemon's
/// own `-d -p` invocation.
pub fn init_script(config: &DaemonConfig) -> String {
    let name = &config.name;
    let filename = config.filename.display();
    let pid_path = config.default_pid_path();
    let pid_path = pid_path.display();

    format!(
        r#"#!/bin/bash
#
# {name} daemon
#

case "$1" in
  start)
    {filename} -d -p {pid_path}
    ;;
  stop)
    kill $(cat {pid_path})
    ;;
  restart)
    $0 stop
    $0 start
    ;;
  status)
    kill -0 $(cat {pid_path} 2>/dev/null) 2>/dev/null
    ;;
  *)
    echo "usage: $0 {{start|stop|restart|status}}"
    exit 1
    ;;
esac
"#
    )
}

/// Write the init script to `/etc/init.d/<name>`, mode 0755.
pub fn write_init_script(config: &DaemonConfig) -> Result<PathBuf, DaemonError> {
    let path = PathBuf::from(format!("/etc/init.d/{}", config.name));
    write_init_script_to(config, &path)?;
    Ok(path)
}

/// Write the init script to an explicit path.
pub fn write_init_script_to(
    config: &DaemonConfig,
    path: &std::path::Path,
) -> Result<(), DaemonError> {
    let mut file = fs::File::create(path)?;
    file.write_all(init_script(config).as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> DaemonConfig {
        let mut config = DaemonConfig::named("queue-runner");
        config.filename = PathBuf::from("/usr/local/bin/queue-runner");
        config
    }

    #[test]
    fn test_help_lists_every_flag() {
        let help = help_text(&config());
        for flag in ["-H", "-i", "-I", "-d", "-v", "-p"] {
            assert!(help.contains(flag), "missing {flag}");
        }
    }

    #[test]
    fn test_instructions_are_numbered_and_extended() {
        let out = install_instructions(&config(), &["Create the database schema".to_string()]);
        assert!(out.starts_with("1. "));
        assert!(out.contains("4. Create the database schema"));
    }

    #[test]
    fn test_init_script_commands() {
        let script = init_script(&config());
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("/usr/local/bin/queue-runner -d -p /var/run/queue-runner.pid"));
        assert!(script.contains("kill $(cat /var/run/queue-runner.pid)"));
        assert!(script.contains("status)"));
        assert!(script.contains("restart)"));
    }

    #[test]
    fn test_write_init_script_sets_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue-runner");

        write_init_script_to(&config(), &path).unwrap();

        let script = std::fs::read_to_string(&path).unwrap();
        assert!(script.contains("start)"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_write_init_script_unwritable_target() {
        let mut config = config();
        config.name = "nope/nope".to_string();
        assert!(write_init_script(&config).is_err());
    }
}
