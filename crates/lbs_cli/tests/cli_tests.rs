//! Integration tests for the `lbs` binary.

// `Command::cargo_bin` is deprecated in newer assert_cmd releases.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;

const OWNER: &str = "7d3c1f0e-5b8a-4c2d-9e6f-0a1b2c3d4e5f";

fn lbs(db: &Path, logs: &Path) -> Command {
    let mut cmd = Command::cargo_bin("lbs").unwrap();
    cmd.env("LBS_LOG_DIR", logs)
        .env_remove("LBS_HORIZON_PAST_DAYS")
        .env_remove("LBS_HORIZON_FUTURE_DAYS")
        .env_remove("LBS_AUTO_FLUSH")
        .arg("--db")
        .arg(db)
        .args(["--as-of", "2025-03-01"]);
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn version_prints_core_version() {
    Command::cargo_bin("lbs")
        .unwrap()
        .env("LBS_LOG_DIR", std::env::temp_dir().join("lbs-cli-test-logs"))
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\""));
}

#[test]
fn task_add_then_load_reports_materialized_day() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("lbs.sqlite3");

    let task = stdout_json(lbs(&db, dir.path()).args([
        "task", "add", "--owner", OWNER, "--name", "Standup", "--load", "2.0", "--context",
        "work", "--rule", "weekly:mon",
    ]));
    assert_eq!(task["name"], "Standup");

    // 2025-03-03 is a Monday.
    let snapshot = stdout_json(lbs(&db, dir.path()).args([
        "load", "--owner", OWNER, "--date", "2025-03-03",
    ]));
    assert_eq!(snapshot["task_count"], 1);
    assert_eq!(snapshot["level"], "SAFE");

    let days = stdout_json(lbs(&db, dir.path()).args([
        "range", "--owner", OWNER, "--start", "2025-03-03", "--end", "2025-03-09",
    ]));
    let days = days.as_array().unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(days[0]["task_count"], 1);
    assert_eq!(days[1]["task_count"], 0);
}

#[test]
fn suppress_exception_empties_the_day() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("lbs.sqlite3");

    let task = stdout_json(lbs(&db, dir.path()).args([
        "task", "add", "--owner", OWNER, "--name", "Gym", "--load", "3.0", "--rule",
        "every:1@2025-03-01",
    ]));
    let task_id = task["id"].as_str().unwrap().to_string();

    lbs(&db, dir.path())
        .args([
            "exception", "add", "--owner", OWNER, "--task", &task_id, "--date", "2025-03-04",
            "--kind", "suppress",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("SUPPRESS"));

    let snapshot = stdout_json(lbs(&db, dir.path()).args([
        "load", "--owner", OWNER, "--date", "2025-03-04",
    ]));
    assert_eq!(snapshot["task_count"], 0);
    assert_eq!(snapshot["adjusted_load"], 0.0);
}

#[test]
fn coefficients_update_creates_new_version() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("lbs.sqlite3");

    let defaults = stdout_json(lbs(&db, dir.path()).args(["coefficients", "--owner", OWNER]));
    assert_eq!(defaults["version"], 0);

    let updated = stdout_json(lbs(&db, dir.path()).args([
        "coefficients", "--owner", OWNER, "--cap", "9.5",
    ]));
    assert_eq!(updated["version"], 1);
    assert_eq!(updated["coefficients"]["cap"], 9.5);
}

#[test]
fn invalid_rule_fails_with_message() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("lbs.sqlite3");

    lbs(&db, dir.path())
        .args([
            "task", "add", "--owner", OWNER, "--name", "Bad", "--load", "1", "--rule",
            "monthly-day:32",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("month_day"));
}

#[test]
fn override_without_load_is_rejected_by_parser() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("lbs.sqlite3");

    lbs(&db, dir.path())
        .args([
            "exception", "add", "--owner", OWNER, "--task", OWNER, "--date", "2025-03-04",
            "--kind", "override",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--load"));
}
