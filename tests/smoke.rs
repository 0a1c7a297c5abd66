//! Smoke tests -- verify the binary runs and key commands work end to end.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn cutwatch(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cutwatch").unwrap();
    cmd.arg("--db")
        .arg(dir.join("cutwatch.db"))
        .arg("--config")
        .arg(dir.join("cutwatch.toml"))
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("cutwatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Predictive-maintenance monitoring"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("cutwatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("cutwatch"));
}

#[test]
fn test_config_subcommand_exists() {
    Command::cargo_bin("cutwatch")
        .unwrap()
        .args(["config", "list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_generate_then_detect_twice() {
    let dir = tempfile::tempdir().unwrap();

    cutwatch(dir.path())
        .args(["generate", "--hours", "12", "--seed", "7", "--start", "2026-01-05T06:00:00Z"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Generated 720 samples"));

    cutwatch(dir.path())
        .args(["detect"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Scanned 720 samples"));

    // Rerunning over the same samples must not log anything new.
    cutwatch(dir.path())
        .args(["detect"])
        .assert()
        .success()
        .stdout(predicates::str::contains(", 0 new."));
}

#[test]
fn test_kpis_json() {
    let dir = tempfile::tempdir().unwrap();
    cutwatch(dir.path())
        .args(["generate", "--hours", "6", "--seed", "11", "--start", "2026-01-05T06:00:00Z"])
        .assert()
        .success();

    let out = cutwatch(dir.path())
        .args(["kpis", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let kpis: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(kpis["TBF"].is_number());
    assert!(kpis["Availability"].is_number());
    assert!(kpis["MTTR"].is_number());
}

#[test]
fn test_kpis_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    cutwatch(dir.path())
        .arg("kpis")
        .assert()
        .success()
        .stdout(predicates::str::contains("No samples"));
}

#[test]
fn test_config_set_get() {
    let dir = tempfile::tempdir().unwrap();

    cutwatch(dir.path())
        .args(["config", "set", "min_stop_duration", "3.5"])
        .assert()
        .success();
    assert!(dir.path().join("cutwatch.toml").exists());

    cutwatch(dir.path())
        .args(["config", "get", "min_stop_duration"])
        .assert()
        .success()
        .stdout(predicates::str::contains("3.5"));

    cutwatch(dir.path())
        .args(["config", "set", "min_stop_duration", "soon"])
        .assert()
        .failure();

    cutwatch(dir.path())
        .args(["config", "get", "not_a_key"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("unknown configuration key"));
}

#[test]
fn test_classify_unknown_stop_fails() {
    let dir = tempfile::tempdir().unwrap();
    cutwatch(dir.path())
        .args([
            "classify",
            "00000000-0000-4000-8000-000000000000",
            "--type",
            "unplanned",
            "--subcategory",
            "Mechanical",
            "--operator",
            "night shift",
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains("no automatic stop"));
}

#[test]
fn test_log_stop_rejects_zero_duration() {
    let dir = tempfile::tempdir().unwrap();
    cutwatch(dir.path())
        .args([
            "log-stop",
            "--type",
            "planned",
            "--subcategory",
            "Break",
            "--duration",
            "0",
            "--operator",
            "ops",
        ])
        .assert()
        .failure();

    cutwatch(dir.path())
        .args([
            "log-stop",
            "--type",
            "planned",
            "--subcategory",
            "Break",
            "--duration",
            "15",
            "--operator",
            "ops",
        ])
        .assert()
        .success();

    cutwatch(dir.path())
        .args(["stops"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Planned stop").and(predicates::str::contains("manual")));
}

#[test]
fn test_cleanup_days_bounds() {
    let dir = tempfile::tempdir().unwrap();

    cutwatch(dir.path())
        .args(["cleanup", "--days", "4294967295"])
        .assert()
        .failure();

    cutwatch(dir.path())
        .args(["cleanup", "--days", "0"])
        .assert()
        .failure();

    cutwatch(dir.path())
        .args(["cleanup", "--days", "3650"])
        .assert()
        .success()
        .stdout(predicates::str::contains("older than 3650 days"));
}

#[test]
fn test_status_shows_state_breakdown() {
    let dir = tempfile::tempdir().unwrap();
    cutwatch(dir.path())
        .args(["generate", "--hours", "6", "--seed", "3", "--start", "2026-01-05T06:00:00Z"])
        .assert()
        .success();

    cutwatch(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicates::str::contains("Samples stored:      360"))
        .stdout(predicates::str::contains("Last 24 hours by state:"));
}
