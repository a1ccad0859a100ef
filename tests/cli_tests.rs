// End-to-end tests of the blockprof binary

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn blockprof() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("blockprof")
}

#[test]
fn test_calibrate_prints_frequency() {
    blockprof()
        .args(["calibrate", "--ms", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Estimated CPU timer frequency"))
        .stdout(predicate::str::contains("OS timer frequency"));
}

#[test]
fn test_demo_single_reports_both_tracks() {
    let assert = blockprof()
        .args(["demo", "--elements", "256", "--calibration-ms", "5"])
        .assert()
        .success();

    if cfg!(feature = "profiling") {
        assert
            .stdout(predicate::str::contains("---- Profiler: Tests"))
            .stdout(predicate::str::contains("---- Profile Track: Main"))
            .stdout(predicate::str::contains("---- Profile Track: SubTrack"))
            .stdout(predicate::str::contains("fill_bandwidth[1]"))
            .stdout(predicate::str::contains("fill_sub_track[1]"));
    } else {
        assert.stdout(predicate::str::contains("Profiling disabled"));
    }
}

#[cfg(feature = "profiling")]
#[test]
fn test_demo_single_exports_csv_and_json() {
    let tmp = TempDir::new().unwrap();
    let csv = tmp.path().join("single.csv");
    let json = tmp.path().join("single.json");

    blockprof()
        .args(["demo", "--elements", "128", "--calibration-ms", "5", "--csv"])
        .arg(&csv)
        .arg("--json")
        .arg(&json)
        .assert()
        .success();

    let text = fs::read_to_string(&csv).unwrap();
    assert!(text.starts_with("EstimatedCPUFrequency\n"));
    assert!(text.contains("\nTests,"));
    assert!(text.contains("SubTrack,"));

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(value["name"], "Tests");
    assert_eq!(value["tracks"].as_array().unwrap().len(), 2);
}

#[cfg(feature = "profiling")]
#[test]
fn test_demo_fixed_exports_repetition_tree() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("fixed");

    blockprof()
        .args(["demo", "--mode", "fixed", "-n", "3", "--elements", "64"])
        .args(["--calibration-ms", "5", "--csv"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 repetitions"));

    assert!(dir.join("Summary").join("Average.csv").exists());
    assert!(dir.join("Summary").join("Variance.csv").exists());
    assert!(dir.join("Repetitions").join("0.csv").exists());
    assert!(dir.join("Repetitions").join("2.csv").exists());
}

#[test]
fn test_demo_fixed_rejects_zero_repetitions() {
    blockprof()
        .args(["demo", "--mode", "fixed", "-n", "0", "--calibration-ms", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--repetitions"));
}

#[test]
fn test_demo_best_of_with_zero_budgets() {
    let assert = blockprof()
        .args(["demo", "--mode", "best-of", "--elements", "64", "--calibration-ms", "5"])
        .args(["--per-test-timeout", "0", "--global-timeout", "0"])
        .assert()
        .success();

    if cfg!(feature = "profiling") {
        assert
            .stdout(predicate::str::contains("==== Best of fill:"))
            .stdout(predicate::str::contains("==== Best of fill_bandwidth:"))
            .stdout(predicate::str::contains("(1 runs; 1 improvements)"));
    }
}

#[test]
fn test_demo_best_of_rejects_negative_budget() {
    blockprof()
        .args(["demo", "--mode", "best-of", "--calibration-ms", "5"])
        .arg("--per-test-timeout=-1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value for --per-test-timeout"));
}

#[test]
fn test_unknown_mode_is_rejected_by_parser() {
    blockprof()
        .args(["demo", "--mode", "forever"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_demo_best_of_rejects_unrepresentable_budget() {
    blockprof()
        .args(["demo", "--mode", "best-of", "--calibration-ms", "5"])
        .args(["--global-timeout", "1e30"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value for --global-timeout"));
}
