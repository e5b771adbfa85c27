//! Tests for the `tc` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `tc` isolated from the user's config and data directories
fn tc(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tc").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"));
    cmd
}

#[test]
fn test_parse_keywords_prints_json() {
    let home = TempDir::new().unwrap();
    tc(&home)
        .args(["parse", "+red -suede"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"keywords\""))
        .stdout(predicate::str::contains("\"suede\""));
}

#[test]
fn test_parse_link() {
    let home = TempDir::new().unwrap();
    tc(&home)
        .args(["parse", "https://kith.com/products/box-logo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"url\""));
}

#[test]
fn test_parse_rejects_bad_token() {
    let home = TempDir::new().unwrap();
    tc(&home)
        .args(["parse", "+red *suede"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("*suede"));
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().unwrap();
    tc(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("tick-ms: 1000"))
        .stdout(predicate::str::contains("due-window-secs: 10"));
}

#[test]
fn test_config_reads_local_file() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".taskcore.yml"), "scheduler:\n  due-window-secs: 30\n").unwrap();
    tc(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("due-window-secs: 30"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let home = TempDir::new().unwrap();
    tc(&home)
        .args(["--config", "missing.yml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_explicit_config_with_zero_tick_fails() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("zero.yml"), "scheduler:\n  tick-ms: 0\n").unwrap();
    tc(&home)
        .args(["--config", "zero.yml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tick-ms must be greater than 0"));
}

#[test]
fn test_invalid_local_config_falls_back_to_defaults() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".taskcore.yml"), "events:\n  capacity: 0\n").unwrap();
    tc(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity: 64"));
}
