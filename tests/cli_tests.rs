//! Binary surface tests for the cpmd driver

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Snapshot for a two-processor machine sharing an L2
fn write_snapshot(path: &Path) {
    let caches = serde_json::json!([
        [{"cpu": 0, "level": 2, "kind": "Unified", "shared_cpus": [0, 1]}],
        [{"cpu": 1, "level": 2, "kind": "Unified", "shared_cpus": [0, 1]}]
    ]);
    fs::write(path, caches.to_string()).unwrap();
}

fn write_raw_trace(dir: &Path, wss: u64) {
    let mut body = String::from("# header\n");
    for (seq, cpmd) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
        let (src, dst) = if seq % 2 == 0 { (0, 1) } else { (1, 1) };
        body.push_str(&format!(
            "{seq}, 2, {wss}, 500, {src}, {dst}, 9000, 1000, 1200, 1100, {}\n",
            1000 + cpmd
        ));
    }
    fs::write(dir.join(format!("pmo_host=rig_wss={wss}.csv")), body).unwrap();
}

#[test]
fn test_cli_full_pipeline_with_snapshot() {
    let work = TempDir::new().unwrap();
    let snapshot = work.path().join("topo.json");
    let traces = work.path().join("traces");
    fs::create_dir_all(&traces).unwrap();
    write_snapshot(&snapshot);
    write_raw_trace(&traces, 64);

    Command::cargo_bin("cpmd")
        .unwrap()
        .arg("--topology")
        .arg(&snapshot)
        .arg("--traces")
        .arg(&traces)
        .arg("--completed")
        .arg(work.path().join("completed"))
        .arg("--model")
        .arg(work.path().join("model"))
        .arg("--host")
        .arg("rig")
        .assert()
        .success()
        .stderr(predicate::str::contains("model record(s)"));

    assert!(work
        .path()
        .join("completed/pmo_host=rig_type=L2_wss=64.csv")
        .exists());
    assert!(work.path().join("model/model_type=L2").exists());
    assert!(work.path().join("model/model_type=PREEMPTION").exists());
}

#[test]
fn test_cli_group_stage_only() {
    let work = TempDir::new().unwrap();
    let snapshot = work.path().join("topo.json");
    let traces = work.path().join("traces");
    fs::create_dir_all(&traces).unwrap();
    write_snapshot(&snapshot);
    write_raw_trace(&traces, 64);

    Command::cargo_bin("cpmd")
        .unwrap()
        .arg("--stage")
        .arg("group")
        .arg("--topology")
        .arg(&snapshot)
        .arg("--traces")
        .arg(&traces)
        .arg("--completed")
        .arg(work.path().join("completed"))
        .arg("--model")
        .arg(work.path().join("model"))
        .arg("--host")
        .arg("rig")
        .assert()
        .success()
        .stderr(predicate::str::contains("grouped 1 trace file(s)"));

    assert!(!work.path().join("model").exists());
}

#[test]
fn test_cli_model_stage_needs_completed_dir() {
    let work = TempDir::new().unwrap();

    Command::cargo_bin("cpmd")
        .unwrap()
        .arg("--stage")
        .arg("model")
        .arg("--completed")
        .arg(work.path().join("missing"))
        .arg("--model")
        .arg(work.path().join("model"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("completed"));
}

#[test]
fn test_cli_bad_snapshot_is_fatal() {
    let work = TempDir::new().unwrap();
    let snapshot = work.path().join("topo.json");
    fs::write(&snapshot, "not json").unwrap();

    Command::cargo_bin("cpmd")
        .unwrap()
        .arg("--topology")
        .arg(&snapshot)
        .arg("--traces")
        .arg(work.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("topo.json"));
}

#[test]
fn test_cli_help_mentions_pipeline() {
    Command::cargo_bin("cpmd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("overhead models"));
}
