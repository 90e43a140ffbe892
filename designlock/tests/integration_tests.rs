//! Integration tests for the DesignLock verification suite

use designlock::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("project")
}

/// Copy of the fixture project that a test may mutate.
fn scratch_project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let source = fixture_root();
    for entry in WalkDir::new(&source) {
        let entry = entry.unwrap();
        let target = dir.path().join(entry.path().strip_prefix(&source).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
    dir
}

fn edit(root: &Path, relative: &str, from: &str, to: &str) {
    let path = root.join(relative);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains(from), "{} does not contain {:?}", relative, from);
    fs::write(&path, text.replacen(from, to, 1)).unwrap();
}

fn run(root: &Path, checker: &str) -> CheckOutcome {
    let project = Project::new(root);
    VerificationSuite::with_registry(CheckerRegistry::with_all_checkers())
        .run_one(&project, checker)
        .unwrap()
}

fn report(outcome: &CheckOutcome) -> &CheckReport {
    outcome
        .report
        .as_ref()
        .unwrap_or_else(|| panic!("{} did not run: {:?}", outcome.checker, outcome.error))
}

#[test]
fn test_fixture_project_passes_every_checker() {
    let project = Project::new(fixture_root());
    let suite = VerificationSuite::new().run_all(&project);

    let ids: Vec<_> = suite.outcomes.iter().map(|o| o.checker.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "schema",
            "value-locks",
            "pin-map",
            "net-labels",
            "geometry",
            "banned-content",
            "voltage-bands",
            "bom-completeness"
        ]
    );
    for outcome in &suite.outcomes {
        assert_eq!(
            outcome.status,
            CheckStatus::Pass,
            "{}: {:?} {:?}",
            outcome.checker,
            outcome.error,
            outcome.report.as_ref().map(|r| r.failures().collect::<Vec<_>>())
        );
    }
    assert!(suite.all_passed());
    assert_eq!(suite.exit_code(), 0);
}

#[test]
fn test_fixture_docs_index_is_complete() {
    let outcome = run(&fixture_root(), "docs-index");
    let report = report(&outcome);
    assert!(report.violations.is_empty(), "{:?}", report.violations);
}

#[test]
fn test_fixture_banned_scan_exempts_history() {
    let outcome = run(&fixture_root(), "banned-content");
    let report = report(&outcome);
    // Old parts appear only in archived or clearly historical lines.
    assert!(report.violations.is_empty(), "{:?}", report.violations);
    assert!(report.passes.iter().any(|p| p.contains("files scanned")));
}

#[test]
fn test_duplicate_gpio_fails_pin_map() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "design_database.yaml",
        "  GPIO6:\n",
        "  GPIO05:\n    function: SPARE_OUT\n    direction: output\n    peripheral: GPIO\n    description: Spare\n  GPIO6:\n",
    );

    let outcome = run(dir.path(), "pin-map");
    assert_eq!(outcome.status, CheckStatus::Fail);
    let conflicts: Vec<_> = report(&outcome).by_rule("pin-map.conflict").collect();
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].reason.contains("ACT_IN1"));
    assert!(conflicts[0].reason.contains("SPARE_OUT"));

    let schema = run(dir.path(), "schema");
    assert_eq!(report(&schema).by_rule("schema.gpio-duplicate").count(), 1);
}

#[test]
fn test_changed_locked_value_fails_value_locks() {
    let dir = scratch_project();
    edit(dir.path(), "design_database.yaml", "    value: 43.2k\n", "    value: 43k\n");

    let outcome = run(dir.path(), "value-locks");
    assert_eq!(outcome.status, CheckStatus::Fail);
    let report = report(&outcome);
    let mismatch: Vec<_> = report.by_rule("value-locks.mismatch").collect();
    assert_eq!(mismatch.len(), 1);
    assert_eq!(mismatch[0].severity, Severity::Critical);
    assert_eq!(mismatch[0].observed.as_deref(), Some("43k"));
    assert_eq!(report.by_rule("value-locks.list-mismatch").count(), 1);
}

#[test]
fn test_missing_bom_row_fails_completeness() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "hardware/BOM_Seed.csv",
        "RFBB,ERA-3AEB4322V,1,43.2k feedback bottom\n",
        "",
    );

    let outcome = run(dir.path(), "bom-completeness");
    assert_eq!(outcome.status, CheckStatus::Fail);
    let missing: Vec<_> = report(&outcome).by_rule("bom-completeness.missing").collect();
    assert_eq!(missing.len(), 1);
    assert!(missing[0].reason.starts_with("U4 (LMR33630ADDAR, Logic-rail buck) requires RFBB"));
    assert!(missing[0].reason.ends_with("43.2k - Feedback bottom"));
}

#[test]
fn test_firmware_threshold_drift_fails_voltage_bands() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "firmware/src/input_ladder.cpp",
        "kLadderIdleMin = 1.55f",
        "kLadderIdleMin = 1.60f",
    );

    let outcome = run(dir.path(), "voltage-bands");
    assert_eq!(outcome.status, CheckStatus::Fail);
    let mismatch: Vec<_> = report(&outcome).by_rule("voltage-bands.mismatch").collect();
    assert_eq!(mismatch.len(), 1);
    assert!(mismatch[0].reason.contains("idle_min"));
}

#[test]
fn test_drift_within_tolerance_still_passes() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "firmware/src/input_ladder.cpp",
        "kLadderIdleMin = 1.55f",
        "kLadderIdleMin = 1.57f",
    );
    assert_eq!(run(dir.path(), "voltage-bands").status, CheckStatus::Pass);
}

#[test]
fn test_legacy_interface_in_firmware_fails_banned_content() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "firmware/include/pins.h",
        "}  // namespace pins",
        "// Was the PPM input on the old board.\n}  // namespace pins",
    );

    let outcome = run(dir.path(), "banned-content");
    assert_eq!(outcome.status, CheckStatus::Fail);
    let hits: Vec<_> = report(&outcome)
        .by_rule("banned-content.legacy-interface")
        .collect();
    // Safe phrases do not exempt this pattern.
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].location,
        Location::line("firmware/include/pins.h", 18)
    );
}

#[test]
fn test_banned_net_label_fails() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "hardware/Net_Labels.csv",
        "GND,ground,System ground\n",
        "GND,ground,System ground\n5V,power,Intermediate rail\n",
    );
    let outcome = run(dir.path(), "banned-content");
    assert_eq!(report(&outcome).by_rule("banned-content.net").count(), 1);

    // The extra label is only informational for the coverage check.
    let labels = run(dir.path(), "net-labels");
    assert_eq!(labels.status, CheckStatus::Pass);
    assert_eq!(report(&labels).by_rule("net-labels.extra").count(), 1);
}

#[test]
fn test_moved_mounting_hole_fails_geometry() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "hardware/SEDU_PCB.kicad_pcb",
        "(at 76 46)",
        "(at 74 46)",
    );
    let outcome = run(dir.path(), "geometry");
    assert_eq!(outcome.status, CheckStatus::Fail);
    let holes: Vec<_> = report(&outcome).by_rule("geometry.hole-position").collect();
    assert_eq!(holes.len(), 1);
    assert_eq!(holes[0].location, Location::section("metadata.mounting_holes[3]"));
}

#[test]
fn test_missing_pcb_is_reported_as_missing() {
    let dir = scratch_project();
    fs::remove_file(dir.path().join("hardware/SEDU_PCB.kicad_pcb")).unwrap();

    let suite = VerificationSuite::new().run_all(&Project::new(dir.path()));
    let geometry = suite.outcomes.iter().find(|o| o.checker == "geometry").unwrap();
    assert_eq!(geometry.status, CheckStatus::Missing);
    assert!(geometry.error.as_deref().unwrap().contains("PCB file not found"));
    assert_eq!(suite.count(CheckStatus::Pass), 7);
    assert_eq!(suite.exit_code(), 2);
}

#[test]
fn test_failure_outranks_missing_in_exit_code() {
    let dir = scratch_project();
    fs::remove_file(dir.path().join("hardware/SEDU_PCB.kicad_pcb")).unwrap();
    edit(dir.path(), "design_database.yaml", "    value: 43.2k\n", "    value: 43k\n");

    let suite = VerificationSuite::new().run_all(&Project::new(dir.path()));
    assert_eq!(suite.count(CheckStatus::Missing), 1);
    assert!(suite.count(CheckStatus::Fail) >= 1);
    assert_eq!(suite.exit_code(), 1);
}

#[test]
fn test_missing_database_makes_every_checker_missing() {
    let dir = scratch_project();
    fs::remove_file(dir.path().join("design_database.yaml")).unwrap();

    let suite = VerificationSuite::new().run_all(&Project::new(dir.path()));
    assert_eq!(suite.count(CheckStatus::Missing), suite.outcomes.len());
    assert_eq!(suite.exit_code(), 2);
}

#[test]
fn test_rule_override_file() {
    let dir = scratch_project();
    edit(
        dir.path(),
        "design_database.yaml",
        "    value: 10uH\n    locked: true\n",
        "    value: 10uH\n",
    );
    assert_eq!(run(dir.path(), "value-locks").status, CheckStatus::Fail);

    let rules = dir.path().join("rules.yaml");
    fs::write(&rules, "value_locks:\n  unlocked_severity: warn\n").unwrap();
    let project = Project::open(dir.path(), Some(rules.as_path())).unwrap();
    let outcome = VerificationSuite::new().run_one(&project, "value-locks").unwrap();
    assert_eq!(outcome.status, CheckStatus::Pass);
    let unlocked: Vec<_> = report(&outcome).by_rule("value-locks.unlocked").collect();
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].severity, Severity::Warn);
}

#[test]
fn test_unknown_checker_is_an_error() {
    let project = Project::new(fixture_root());
    let err = VerificationSuite::new().run_one(&project, "nope").unwrap_err();
    assert!(matches!(err, DesignLockError::UnknownChecker(ref id) if id == "nope"));
}
