use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dualk-elo"))
        .args(args)
        .arg("--config")
        .arg(dir.join("absent.toml"))
        .env("HOME", dir)
        .env_remove("DUALK_LOG")
        .output()
        .unwrap()
}

fn write_csv(dir: &Path, content: &str) -> String {
    let path = dir.join("interactions.csv");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_default_run_prints_report() {
    let dir = tempdir().unwrap();
    let csv = write_csv(dir.path(), "A,B\nB,C\nA,C\nB,A\n");

    let out = run_cli(dir.path(), &["-f", &csv, "--optimization-level", "0", "--n-random", "10", "--seed", "5"]);
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("Dual-K Elo ratings (3 individuals, 4 interactions)"));
    assert!(stdout.contains("Linearity index:"));
    for id in ["A", "B", "C"] {
        assert!(stdout.lines().any(|l| l.contains(&format!(" {id} "))));
    }
}

#[test]
fn test_json_output() {
    let dir = tempdir().unwrap();
    let csv = write_csv(dir.path(), "winner,loser\nA,B\nB,C\nA,C\nB,A\n");

    let out = run_cli(dir.path(), &["-f", &csv, "--json", "--n-random", "3", "--seed", "1", "--optimization-level", "1"]);
    assert!(out.status.success());

    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["num_interactions"], 4);
    assert_eq!(value["permutation"]["successful_trials"], 3);
    assert_eq!(value["rankings"].as_array().unwrap().len(), 3);
}

#[test]
fn test_self_interaction_fails() {
    let dir = tempdir().unwrap();
    let csv = write_csv(dir.path(), "A,B\nC,C\n");

    let out = run_cli(dir.path(), &["-f", &csv]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("self-interaction at line 2"));
}

#[test]
fn test_missing_file_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.csv");

    let out = run_cli(dir.path(), &["-f", missing.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8(out.stderr).unwrap().contains("failed to read"));
}

#[test]
fn test_parameter_errors_fail_before_loading() {
    let dir = tempdir().unwrap();
    // The file does not exist: the parameter error must be reported first.
    let missing = dir.path().join("missing.csv");

    let out = run_cli(dir.path(), &["-f", missing.to_str().unwrap(), "--top-n", "25"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8(out.stderr).unwrap().contains("top-n"));

    let out = run_cli(dir.path(), &["-f", missing.to_str().unwrap(), "--n-random", "0"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8(out.stderr).unwrap().contains("n-random"));
}

#[test]
fn test_init_config_writes_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg").join("config.toml");

    let first = Command::new(env!("CARGO_BIN_EXE_dualk-elo"))
        .arg("--init-config")
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();
    assert!(first.status.success());
    assert!(path.exists());

    let second = Command::new(env!("CARGO_BIN_EXE_dualk-elo"))
        .arg("--init-config")
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(second.status.code(), Some(1));
}
