//! Frozen component values.
//!
//! A value counts as locked only when it normalizes to the expected quantity
//! and the component carries `locked: true`. Correct but unmarked values are
//! reported at the configured severity.

use std::collections::BTreeMap;

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::ValueLockRules;
use crate::core::Project;
use crate::database::{Component, LockedValueEntry, Metadata};
use crate::units::{normalize_value, parse_board_size, sanitize_ascii, within_tolerance};

pub struct ValueLockChecker;

impl Checker for ValueLockChecker {
    fn id(&self) -> &'static str {
        "value-locks"
    }

    fn name(&self) -> &'static str {
        "Value locks"
    }

    fn description(&self) -> &'static str {
        "Frozen component values, lock markers, locked_values list, frozen board size"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let db = project.load_database()?;
        let components = db.components()?;
        let metadata = db.metadata()?;
        let locked_values = db.locked_values()?;
        Ok(check_value_locks(
            &components,
            &locked_values,
            &metadata,
            &project.config().value_locks,
        ))
    }
}

/// Compare two component values as quantities, falling back to text when
/// either side does not parse.
pub fn values_match(a: &str, b: &str) -> bool {
    match (normalize_value(a), normalize_value(b)) {
        (Ok(a), Ok(b)) => a.approx_eq(&b),
        _ => sanitize_ascii(a.trim()).eq_ignore_ascii_case(&sanitize_ascii(b.trim())),
    }
}

pub fn check_value_locks(
    components: &BTreeMap<String, Component>,
    locked_values: &[LockedValueEntry],
    metadata: &Metadata,
    rules: &ValueLockRules,
) -> CheckReport {
    let mut report = CheckReport::new("value-locks", "Value locks");

    for lock in &rules.expected {
        let location = Location::section(format!("components.{}", lock.reference));
        let Some(component) = components.get(&lock.reference) else {
            report.push(
                Violation::new(
                    "value-locks.missing",
                    Severity::High,
                    location,
                    format!("{} not found in database ({})", lock.reference, lock.reason),
                )
                .expected(&lock.value),
            );
            continue;
        };

        let actual = component.value.as_deref().unwrap_or("");
        if !values_match(actual, &lock.value) {
            report.push(
                Violation::new(
                    "value-locks.mismatch",
                    Severity::Critical,
                    location,
                    format!("{} changed from its frozen value ({})", lock.reference, lock.reason),
                )
                .observed(if actual.is_empty() { "<none>" } else { actual })
                .expected(&lock.value),
            );
        } else if !component.locked {
            report.push(
                Violation::new(
                    "value-locks.unlocked",
                    rules.unlocked_severity,
                    location,
                    format!("{} has the frozen value but is not marked locked", lock.reference),
                )
                .observed(actual)
                .expected("locked: true"),
            );
        } else {
            report.pass(format!("{} = {} (locked)", lock.reference, actual));
        }
    }

    check_locked_values_list(components, locked_values, &mut report);
    check_frozen_metadata(metadata, rules, &mut report);

    tracing::debug!(
        "Value locks: {} expected, {} failures",
        rules.expected.len(),
        report.failure_count()
    );
    report
}

fn check_locked_values_list(
    components: &BTreeMap<String, Component>,
    locked_values: &[LockedValueEntry],
    report: &mut CheckReport,
) {
    if locked_values.is_empty() {
        return;
    }

    for (idx, entry) in locked_values.iter().enumerate() {
        let location = Location::section(format!("verification_rules.locked_values[{}]", idx));
        match components.get(&entry.component) {
            None => report.push(Violation::new(
                "value-locks.list-unknown",
                Severity::Warn,
                location,
                format!("locked_values names unknown component {}", entry.component),
            )),
            Some(component) => {
                let actual = component.value.as_deref().unwrap_or("");
                if !values_match(actual, &entry.value) {
                    report.push(
                        Violation::new(
                            "value-locks.list-mismatch",
                            Severity::Critical,
                            location,
                            format!("{} disagrees with locked_values", entry.component),
                        )
                        .observed(actual)
                        .expected(&entry.value),
                    );
                }
            }
        }
    }

    for (reference, component) in components {
        if component.locked && !locked_values.iter().any(|e| &e.component == reference) {
            report.push(Violation::new(
                "value-locks.list-absent",
                Severity::Warn,
                Location::section(format!("components.{}", reference)),
                format!("{} is locked but not listed in locked_values", reference),
            ));
        }
    }
}

fn check_frozen_metadata(metadata: &Metadata, rules: &ValueLockRules, report: &mut CheckReport) {
    let location = Location::section("metadata.board_size");
    match metadata.board_size.as_deref() {
        None => report.push(
            Violation::new(
                "value-locks.board-size",
                Severity::High,
                location,
                "board size is not declared",
            )
            .expected(&rules.frozen_board_size),
        ),
        Some(declared) => {
            let same = match (parse_board_size(declared), parse_board_size(&rules.frozen_board_size)) {
                (Some((w, h)), Some((fw, fh))) => {
                    within_tolerance(w, fw, 0.0) && within_tolerance(h, fh, 0.0)
                }
                _ => false,
            };
            if same {
                report.pass(format!("board size {}", declared));
            } else {
                report.push(
                    Violation::new(
                        "value-locks.board-size",
                        Severity::Critical,
                        location,
                        "board size differs from the frozen size",
                    )
                    .observed(declared)
                    .expected(&rules.frozen_board_size),
                );
            }
        }
    }

    if metadata.frozen != Some(true) {
        report.push(Violation::new(
            "value-locks.not-frozen",
            Severity::Warn,
            Location::section("metadata.frozen"),
            "design is not marked frozen",
        ));
    }
}
