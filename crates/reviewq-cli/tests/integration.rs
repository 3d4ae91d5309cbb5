#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Every test pins `--config` into a temp dir so a stray reviewq.yaml on the
/// machine never leaks in.
fn reviewq(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reviewq").unwrap();
    cmd.current_dir(dir.path())
        .env("REVIEWQ_CONFIG", dir.path().join("reviewq.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

fn offline(dir: &TempDir) -> Command {
    let mut cmd = reviewq(dir);
    cmd.arg("--offline");
    cmd
}

// ---------------------------------------------------------------------------
// reads
// ---------------------------------------------------------------------------

#[test]
fn queue_lists_pending_demo_cards() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("c-101"))
        .stdout(predicate::str::contains("c-104"))
        .stdout(predicate::str::contains("c-105").not());
}

#[test]
fn queue_filter_narrows_the_slice() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .args(["queue", "--filter", "high_risk"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c-101"))
        .stdout(predicate::str::contains("c-102").not());
}

#[test]
fn queue_json_is_a_page() {
    let dir = TempDir::new().unwrap();
    let out = offline(&dir)
        .args(["--json", "queue", "--status", "handled"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let page: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(page["cards"][0]["id"], "c-106");
}

#[test]
fn unknown_filter_fails() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .args(["queue", "--filter", "urgent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("urgent"));
}

#[test]
fn stats_shows_banner_and_efficiency() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("4 decisions are waiting for you"))
        .stdout(predicate::str::contains("Handled autonomously today: 7/12"));
}

#[test]
fn conversation_prints_messages() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .args(["conversation", "obj-c-101"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Contract signing"))
        .stdout(predicate::str::contains("Priya:"));
}

// ---------------------------------------------------------------------------
// mutations
// ---------------------------------------------------------------------------

#[test]
fn approve_reports_new_status() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .args(["approve", "c-102"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved c-102 (handled)"));
}

#[test]
fn escalate_json_reports_settled_card() {
    let dir = TempDir::new().unwrap();
    let out = offline(&dir)
        .args(["--json", "escalate", "c-104", "--reason", "finance"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(outcome["outcome"], "settled");
    assert_eq!(outcome["card"]["escalated"], true);
}

#[test]
fn approving_a_non_pending_card_is_a_conflict() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .args(["approve", "c-106"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rolled back"));
}

#[test]
fn unknown_card_fails() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .args(["approve", "c-999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("card not found: c-999"));
}

#[test]
fn blank_reason_is_rejected_before_any_request() {
    let dir = TempDir::new().unwrap();
    offline(&dir)
        .args(["override", "c-101", "--reason", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--reason cannot be empty"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_defaults_once() {
    let dir = TempDir::new().unwrap();
    reviewq(&dir).args(["config", "init"]).assert().success();
    let written = std::fs::read_to_string(dir.path().join("reviewq.yaml")).unwrap();
    assert!(written.contains("base_url"));
    assert!(written.contains("urgent_threshold: 5"));

    reviewq(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    reviewq(&dir)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn config_show_reflects_file_overrides() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("reviewq.yaml"),
        "policy:\n  urgent_threshold: 9\n",
    )
    .unwrap();
    let out = reviewq(&dir)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let cfg: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(cfg["policy"]["urgent_threshold"], 9);
    assert_eq!(cfg["cache"]["queue_poll_secs"], 30);
}

#[test]
fn config_validate_flags_zero_poll() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("reviewq.yaml"),
        "cache:\n  stats_poll_secs: 0\n",
    )
    .unwrap();
    reviewq(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("cache.stats_poll_secs must be greater than zero"));
}

#[test]
fn invalid_yaml_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("reviewq.yaml"), "cache: [not, a, map]\n").unwrap();
    offline(&dir)
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
