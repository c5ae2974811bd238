
use super::*;
use tempfile::TempDir;

fn temp_log() -> (TempDir, DaemonLog) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("daemon.log");
    (dir, DaemonLog::new(Some(path), false))
}

#[test]
fn test_file_is_opened_lazily() {
    let (_dir, log) = temp_log();
    assert!(!log.path().unwrap().exists());
}

#[test]
fn test_header_written_on_first_open() {
    let (_dir, mut log) = temp_log();
    log.info("hello");

    let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
    assert!(contents.starts_with("Date"));
    assert!(contents.contains("PID"));
    assert!(contents.contains("Message"));
}

#[test]
fn test_header_written_once_per_handle() {
    let (_dir, mut log) = temp_log();
    log.info("one");
    log.info("two");

    let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
    assert_eq!(contents.matches("Message").count(), 1);
}

#[test]
fn test_line_format() {
    let (_dir, mut log) = temp_log();
    log.info("interval pressure");

    let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
    let line = contents.lines().last().unwrap();

    // [YYYY-MM-DD HH:MM:SS] <pid right-padded> <message>
    assert!(line.starts_with('['));
    assert_eq!(&line[11..12], " ");
    assert_eq!(&line[20..22], "] ");
    assert!(line.contains(&std::process::id().to_string()));
    assert!(line.ends_with("interval pressure"));
}

#[test]
fn test_warn_lines_are_marked() {
    let (_dir, mut log) = temp_log();
    log.warn("interval nearly exhausted");

    let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
    assert!(contents.contains("Warning: interval nearly exhausted"));
}

#[test]
fn test_error_lines_are_marked() {
    let (_dir, mut log) = temp_log();
    log.error("loop interval exceeded");

    let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
    assert!(contents.contains("Error: loop interval exceeded"));
}

#[test]
fn test_lines_append() {
    let (_dir, mut log) = temp_log();
    log.info("first");
    log.error("second");
    log.info("third");

    let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4); // header + 3 lines
    assert!(lines[1].ends_with("first"));
    assert!(lines[2].ends_with("Error: second"));
    assert!(lines[3].ends_with("third"));
}

#[test]
fn test_unwritable_path_falls_back_without_panicking() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing-subdir").join("daemon.log");
    let mut log = DaemonLog::new(Some(path.clone()), false);

    log.info("goes to stdout");
    log.error("still no panic");
    assert!(!path.exists());
}

#[test]
fn test_stdout_only_mode() {
    let mut log = DaemonLog::new(None, true);
    log.info("nothing persisted");
    assert!(log.path().is_none());
}
