//! Example: adjust the rule tables and call a pure checker directly
//! (without VerificationSuite).
//! Run with: cargo run --example custom_rules [path/to/project]

use designlock::config::ExpectedLock;
use designlock::rules::value_locks::check_value_locks;
use designlock::{DesignDatabase, RuleConfig, Severity};
use std::path::PathBuf;

fn main() -> Result<(), designlock::DatabaseError> {
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/project"));

    let mut config = RuleConfig::default();
    config.value_locks.unlocked_severity = Severity::Warn;
    config.value_locks.expected.push(ExpectedLock {
        reference: "C_VM".into(),
        value: "10uF".into(),
        reason: "Actuator bulk capacitance".into(),
    });

    let db = DesignDatabase::load(&root.join(&config.paths.database))?;
    let report = check_value_locks(
        &db.components()?,
        &db.locked_values()?,
        &db.metadata()?,
        &config.value_locks,
    );

    println!(
        "Value locks for {}: {} failure(s), {} warning(s)",
        root.display(),
        report.failure_count(),
        report.warning_count()
    );
    for v in &report.violations {
        println!("  [{}] {}: {}", v.severity, v.location, v.reason);
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
