
use super::*;
use tempfile::TempDir;

fn temp_pid_file() -> (TempDir, PidFile) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.pid");
    (dir, PidFile::new(path))
}

#[test]
fn test_pid_file_new() {
    let pid = PidFile::new("/tmp/test.pid");
    assert_eq!(pid.path(), Path::new("/tmp/test.pid"));
}

#[test]
fn test_read_missing_file() {
    let (_dir, pid) = temp_pid_file();
    assert!(pid.read().unwrap().is_none());
}

#[test]
fn test_write_records_own_pid() {
    let (_dir, mut pid) = temp_pid_file();
    pid.write().unwrap();

    assert_eq!(pid.read().unwrap(), Some(std::process::id()));
    assert!(pid.is_owned());
}

#[test]
fn test_content_is_bare_decimal() {
    let (_dir, mut pid) = temp_pid_file();
    pid.write().unwrap();

    let raw = std::fs::read_to_string(pid.path()).unwrap();
    assert_eq!(raw, std::process::id().to_string());
}

#[test]
fn test_release_removes_owned_file() {
    let (_dir, mut pid) = temp_pid_file();
    pid.write().unwrap();

    assert!(pid.release().unwrap());
    assert!(!pid.path().exists());
}

#[test]
fn test_release_leaves_reused_file() {
    let (_dir, mut pid) = temp_pid_file();
    pid.write().unwrap();

    // Another instance took over the file.
    std::fs::write(pid.path(), "999999").unwrap();

    assert!(!pid.release().unwrap());
    assert!(pid.path().exists());
    assert_eq!(std::fs::read_to_string(pid.path()).unwrap(), "999999");
}

#[test]
fn test_release_missing_file_is_ok() {
    let (_dir, mut pid) = temp_pid_file();
    assert!(!pid.release().unwrap());
}

#[test]
fn test_invalid_content_is_an_error() {
    let (_dir, pid) = temp_pid_file();
    std::fs::write(pid.path(), "not-a-pid").unwrap();
    assert!(pid.read().is_err());
}

#[test]
fn test_creates_parent_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run").join("nested").join("test.pid");
    let mut pid = PidFile::new(path.clone());

    pid.write().unwrap();
    assert!(path.exists());
}

#[test]
fn test_drop_removes_owned_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.pid");

    {
        let mut pid = PidFile::new(path.clone());
        pid.write().unwrap();
        assert!(path.exists());
    }

    assert!(!path.exists());
}

#[test]
fn test_drop_leaves_reused_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.pid");

    {
        let mut pid = PidFile::new(path.clone());
        pid.write().unwrap();
        std::fs::write(&path, "424242").unwrap();
    }

    assert!(path.exists());
}
