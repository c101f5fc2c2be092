//! End-to-end runs of the primesieve binary

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn primesieve() -> Command {
    let mut cmd = Command::cargo_bin("primesieve").unwrap();
    cmd.env_remove("PRIMESIEVE_LIMIT")
        .env_remove("PRIMESIEVE_WORKERS")
        .env_remove("RUST_LOG");
    cmd
}

fn json_report(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

/// Cluster mode spawns ranks 1.. as worker processes over loopback TCP
#[test]
fn test_cluster_mode_end_to_end() {
    let report = json_report(primesieve().args([
        "--mode", "cluster", "-n", "10000", "-w", "3", "-t", "1", "--timeout", "20s", "--json",
        "--verify", "--quiet",
    ]));

    assert_eq!(report["mode"], "cluster");
    assert_eq!(report["prime_count"], 1229);

    let per_rank = report["per_rank"].as_array().unwrap();
    assert_eq!(per_rank.len(), 3);
    let total: u64 = per_rank.iter().map(|r| r["prime_count"].as_u64().unwrap()).sum();
    assert_eq!(total, 1229);
    assert_eq!(per_rank[2]["stop"], 10000);

    assert_eq!(report["verification"]["expected_count"], 1229);
    assert_eq!(report["verification"]["actual_count"], 1229);
    assert_eq!(report["verification"]["partitions_checked"], 1);
}

#[test]
fn test_standalone_mode_writes_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("report.json");

    primesieve()
        .args(["-n", "1000", "-w", "4", "--verify", "--quiet", "--json-output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("168"));

    let report: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(report["mode"], "standalone");
    assert_eq!(report["prime_count"], 168);
    assert_eq!(report["verification"]["partitions_checked"], 4);
}

#[test]
fn test_sequential_mode() {
    let report = json_report(primesieve().args(["--mode", "sequential", "-n", "100", "--json"]));
    assert_eq!(report["prime_count"], 25);
}

#[test]
fn test_dry_run_prints_partitions() {
    primesieve()
        .args(["-n", "100", "-w", "3", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rank 2: [66, 100)"))
        .stdout(predicate::str::contains("configuration validated successfully"));
}

#[test]
fn test_worker_mode_requires_connect() {
    primesieve()
        .args(["--mode", "worker"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--connect is required"));
}
