//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn classpulse() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("classpulse").unwrap();
    // Point both services at a closed port so no test touches the network.
    cmd.env("CLASSPULSE_STORE_URL", "http://127.0.0.1:1");
    cmd.env("CLASSPULSE_PREDICT_URL", "http://127.0.0.1:1");
    cmd
}

#[test]
fn help_output() {
    classpulse()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Teacher dashboard analytics"))
        .stdout(predicate::str::contains("roster"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn version_output() {
    classpulse()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("classpulse"));
}

#[test]
fn unknown_subcommand_fails() {
    classpulse()
        .arg("forecast")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn roster_requires_teacher_id() {
    classpulse().arg("roster").assert().failure();
}

#[test]
fn roster_rejects_empty_teacher_id() {
    classpulse()
        .arg("roster")
        .arg("--teacher-id")
        .arg("  ")
        .assert()
        .failure()
        .stderr(predicate::str::contains("teacher id must not be empty"));
}

#[test]
fn roster_rejects_unknown_format() {
    classpulse()
        .arg("roster")
        .arg("--teacher-id")
        .arg("t1")
        .arg("--format")
        .arg("csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));
}

#[test]
fn roster_rejects_zero_parallelism() {
    classpulse()
        .arg("roster")
        .arg("--teacher-id")
        .arg("t1")
        .arg("--parallelism")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("parallelism must be at least 1"));
}

#[test]
fn roster_fails_when_store_unreachable() {
    classpulse()
        .arg("roster")
        .arg("--teacher-id")
        .arg("t1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn roster_missing_config_file_errors() {
    classpulse()
        .arg("roster")
        .arg("--teacher-id")
        .arg("t1")
        .arg("--config")
        .arg("no_such_config.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn health_reports_unreachable_store() {
    classpulse()
        .arg("health")
        .assert()
        .failure()
        .stdout(predicate::str::contains("store      DOWN"))
        .stderr(predicate::str::contains("document store unreachable"));
}

#[test]
fn health_reads_explicit_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("classpulse.toml");
    std::fs::write(
        &path,
        "[store]\nbase_url = \"http://127.0.0.1:1\"\n\n[predictor]\nbase_url = \"http://127.0.0.1:1\"\n",
    )
    .unwrap();

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("classpulse").unwrap();
    cmd.arg("health")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("http://127.0.0.1:1"));
}
