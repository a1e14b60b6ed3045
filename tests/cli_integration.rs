use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_ascii_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("signal.txt");
    let output = dir.path().join("reconstructed.txt");
    let report = dir.path().join("report.json");

    let mut content = String::new();
    for _ in 0..100 {
        content.push_str("1.0 1.0 1.0\n");
    }
    fs::write(&input, content).unwrap();

    Command::cargo_bin("cola")
        .unwrap()
        .arg("--input")
        .arg(&input)
        .arg("--n-samples")
        .arg("16")
        .arg("--n-overlap")
        .arg("8")
        .arg("--chunk-size")
        .arg("7")
        .arg("--output")
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("max reconstruction error"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["n_total"], 100);
    assert_eq!(report["n_channels"], 3);
    assert_eq!(report["window"], "hann");
    assert!(report["max_reconstruction_error"].as_f64().unwrap() < 1e-9);

    let reconstructed = fs::read_to_string(&output).unwrap();
    let rows: Vec<&str> = reconstructed.lines().collect();
    assert_eq!(rows.len(), 100);
    for row in &rows {
        let values: Vec<f64> = row
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(values.len(), 3);
        for value in values {
            assert!((value - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn test_synthetic_run_without_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.json");

    Command::cargo_bin("cola")
        .unwrap()
        .arg("--synth-samples")
        .arg("300")
        .arg("--synth-channels")
        .arg("2")
        .arg("--n-samples")
        .arg("64")
        .arg("--n-overlap")
        .arg("32")
        .arg("--report")
        .arg(&report)
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["input_path"], "<synthetic>");
    assert_eq!(report["n_total"], 300);
    assert!(report["max_reconstruction_error"].as_f64().unwrap() < 1e-9);
}

#[test]
fn test_unknown_window_family_fails() {
    Command::cargo_bin("cola")
        .unwrap()
        .arg("--window")
        .arg("kaiser")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown window family"));
}

#[test]
fn test_uncertified_window_overlap_pair_fails() {
    Command::cargo_bin("cola")
        .unwrap()
        .arg("--window")
        .arg("triangular")
        .arg("--synth-samples")
        .arg("100")
        .arg("--n-samples")
        .arg("10")
        .arg("--n-overlap")
        .arg("3")
        .assert()
        .failure()
        .stderr(predicate::str::contains("COLA constraint violated"));
}
