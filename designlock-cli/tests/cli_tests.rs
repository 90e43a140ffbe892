//! CLI integration tests

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Build command for the designlock binary (finds it in target/debug when run via cargo test).
fn designlock_cli() -> Command {
    cargo_bin_cmd!("designlock")
}

/// Path to the designlock library fixture project (relative to workspace).
fn fixture_project() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("designlock")
        .join("tests")
        .join("fixtures")
        .join("project")
}

fn copy_tree(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

#[test]
fn test_cli_help() {
    let mut cmd = designlock_cli();

    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Design-database consistency checks"));
}

#[test]
fn test_cli_version() {
    let mut cmd = designlock_cli();

    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_all_on_fixture_passes() {
    let mut cmd = designlock_cli();

    cmd.arg("--root").arg(fixture_project()).arg("all");
    cmd.assert()
        .code(0)
        .stdout(predicate::str::contains("VERIFICATION SUMMARY"))
        .stdout(predicate::str::contains("[PASS] All 8 checks passed"));
}

#[test]
fn test_cli_check_single_checker() {
    let mut cmd = designlock_cli();

    cmd.arg("--root")
        .arg(fixture_project())
        .arg("check")
        .arg("voltage-bands");
    cmd.assert()
        .code(0)
        .stdout(predicate::str::contains("VOLTAGE BANDS"))
        .stdout(predicate::str::contains("[PASS] Voltage bands"));
}

#[test]
fn test_cli_check_docs_index_on_request() {
    let mut cmd = designlock_cli();

    cmd.arg("--root")
        .arg(fixture_project())
        .arg("check")
        .arg("docs-index");
    cmd.assert().code(0);
}

#[test]
fn test_cli_unknown_checker() {
    let mut cmd = designlock_cli();

    cmd.arg("--root").arg(fixture_project()).arg("check").arg("nope");
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("unknown checker 'nope'"))
        .stderr(predicate::str::contains("bom-completeness"));
}

#[test]
fn test_cli_missing_root() {
    let mut cmd = designlock_cli();

    cmd.arg("--root").arg("/definitely/not/here").arg("all");
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("project root not found"));
}

#[test]
fn test_cli_failure_exit_code_and_github_format() {
    let dir = tempfile::tempdir().unwrap();
    copy_tree(&fixture_project(), dir.path());
    let db = dir.path().join("design_database.yaml");
    let text = fs::read_to_string(&db).unwrap();
    fs::write(&db, text.replacen("    value: 43.2k\n", "    value: 43k\n", 1)).unwrap();

    let mut cmd = designlock_cli();
    cmd.arg("--root")
        .arg(dir.path())
        .arg("--format")
        .arg("github")
        .arg("check")
        .arg("value-locks");
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("::error title=value-locks::"))
        .stdout(predicate::str::contains("RFBB"));
}

#[test]
fn test_cli_missing_artifact_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    copy_tree(&fixture_project(), dir.path());
    fs::remove_file(dir.path().join("hardware/BOM_Seed.csv")).unwrap();

    let mut cmd = designlock_cli();
    cmd.arg("--root")
        .arg(dir.path())
        .arg("check")
        .arg("bom-completeness");
    cmd.assert()
        .code(2)
        .stdout(predicate::str::contains("[MISSING] bom-completeness"))
        .stderr(predicate::str::contains("BOM not found"));
}

#[test]
fn test_cli_json_output() {
    let mut cmd = designlock_cli();

    cmd.arg("--root")
        .arg(fixture_project())
        .arg("--format")
        .arg("json")
        .arg("all");
    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(0));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcomes = json["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(|o| o["status"] == "PASS"));
    assert!(json["timestamp"].is_string());
}

#[test]
fn test_cli_checkers_list() {
    let mut cmd = designlock_cli();

    cmd.arg("checkers").arg("-v");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("pin-map"))
        .stdout(predicate::str::contains("docs-index (on request)"))
        .stdout(predicate::str::contains("Button-ladder thresholds"));
}

#[test]
fn test_cli_normalize() {
    let mut cmd = designlock_cli();

    cmd.arg("normalize").arg("140k").arg("10k");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("140k = 140000 Ohm"))
        .stdout(predicate::str::contains("10k = 10000 Ohm"));
}

#[test]
fn test_cli_normalize_rejects_garbage() {
    let mut cmd = designlock_cli();

    cmd.arg("normalize").arg("banana");
    cmd.assert().code(2).stderr(predicate::str::contains("Error"));
}
