//! Startup behaviour of the server binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn server_bin() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_htadmin-server") {
        return PathBuf::from(path);
    }
    PathBuf::from("./target/debug/htadmin-server")
}

struct TestResult {
    stdout: String,
    stderr: String,
    success: bool,
}

fn run_server(args: &[&str], cwd: &Path) -> TestResult {
    let output = Command::new(server_bin())
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("Failed to execute htadmin-server");

    TestResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    }
}

fn create_test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

#[test]
fn test_version_flags() {
    let dir = create_test_dir();
    for flag in ["-v", "--version"] {
        let result = run_server(&[flag], dir.path());
        assert!(result.success, "stderr: {}", result.stderr);
        assert!(
            result.stdout.contains(env!("CARGO_PKG_VERSION")),
            "stdout: {}",
            result.stdout
        );
    }
}

#[test]
fn test_unknown_argument() {
    let dir = create_test_dir();
    let result = run_server(&["--bogus"], dir.path());
    assert!(!result.success);
    assert!(result.stderr.contains("--bogus"), "stderr: {}", result.stderr);
}

#[test]
fn test_missing_credentials_file_is_fatal() {
    let dir = create_test_dir();
    let result = run_server(&["--no-log"], dir.path());
    assert!(!result.success);
    assert!(
        result.stderr.contains("Can't load admin credentials"),
        "stderr: {}",
        result.stderr
    );
    assert!(!dir.path().join(".htpasswd").exists());
}

#[test]
fn test_credentials_without_usable_users_is_fatal() {
    let dir = create_test_dir();
    let creds = dir.path().join("admins.yaml");
    fs::write(&creds, "users:\n  admin: ''\n").unwrap();

    let result = run_server(
        &["--no-log", "--credentials", creds.to_str().unwrap()],
        dir.path(),
    );
    assert!(!result.success);
    assert!(
        result.stderr.contains("no usable users"),
        "stderr: {}",
        result.stderr
    );
}
