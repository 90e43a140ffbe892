//! Structural validation of the design database itself.

use std::collections::{BTreeMap, HashMap};

use serde_yaml::{Mapping, Value};

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::SchemaRules;
use crate::core::Project;
use crate::database::{scalar_to_string, DesignDatabase, IcReference};
use crate::units::parse_board_size;

pub struct SchemaChecker;

impl Checker for SchemaChecker {
    fn id(&self) -> &'static str {
        "schema"
    }

    fn name(&self) -> &'static str {
        "Database schema"
    }

    fn description(&self) -> &'static str {
        "Mandatory sections, metadata, IC, component and GPIO fields, cross-references"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let db = project.load_database()?;
        Ok(check_schema(&db, &project.config().schema))
    }
}

const RULE: &str = "schema";

fn has_field(entry: &Value, field: &str) -> bool {
    entry
        .as_mapping()
        .and_then(|m| m.get(field))
        .is_some_and(|v| !v.is_null())
}

fn sorted_entries(mapping: &Mapping) -> BTreeMap<String, &Value> {
    mapping
        .iter()
        .filter_map(|(k, v)| scalar_to_string(k).map(|k| (k, v)))
        .collect()
}

fn missing_fields(entry: &Value, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|f| !has_field(entry, f))
        .cloned()
        .collect()
}

pub fn check_schema(db: &DesignDatabase, rules: &SchemaRules) -> CheckReport {
    let mut report = CheckReport::new(RULE, "Database schema");

    for section in &rules.required_sections {
        if db.has_section(section) {
            report.pass(format!("section '{}' present", section));
        } else {
            report.push(Violation::new(
                format!("{}.section-missing", RULE),
                Severity::Critical,
                Location::section(section),
                format!("mandatory section '{}' is missing", section),
            ));
        }
    }

    check_metadata(db, rules, &mut report);
    check_ics(db, rules, &mut report);
    check_components(db, rules, &mut report);
    check_gpio(db, rules, &mut report);
    check_firmware_constants(db, rules, &mut report);

    tracing::debug!(
        "Schema check: {} failures, {} warnings",
        report.failure_count(),
        report.warning_count()
    );
    report
}

fn check_metadata(db: &DesignDatabase, rules: &SchemaRules, report: &mut CheckReport) {
    let Some(metadata) = db.get_section("metadata") else {
        return;
    };
    for field in missing_fields(metadata, &rules.required_metadata) {
        report.push(Violation::new(
            format!("{}.metadata-field", RULE),
            Severity::High,
            Location::section(format!("metadata.{}", field)),
            format!("metadata field '{}' is missing", field),
        ));
    }

    let board_size = metadata
        .as_mapping()
        .and_then(|m| m.get("board_size"))
        .and_then(scalar_to_string);
    if let Some(size) = board_size {
        if parse_board_size(&size).is_none() {
            report.push(
                Violation::new(
                    format!("{}.board-size-format", RULE),
                    Severity::Warn,
                    Location::section("metadata.board_size"),
                    "board_size should be written as WxH",
                )
                .observed(&size)
                .expected("e.g. 80x50"),
            );
        }
    }
}

fn check_ics(db: &DesignDatabase, rules: &SchemaRules, report: &mut CheckReport) {
    let Some(ics) = db.get_section("ics") else {
        return;
    };
    let Some(ics) = ics.as_mapping() else {
        report.push(Violation::new(
            format!("{}.ics-shape", RULE),
            Severity::Critical,
            Location::section("ics"),
            "ics must be a mapping of reference to IC record",
        ));
        return;
    };

    let mut complete = 0;
    for (reference, entry) in sorted_entries(ics) {
        let missing = missing_fields(entry, &rules.required_ic_fields);
        if missing.is_empty() {
            complete += 1;
            continue;
        }
        report.push(Violation::new(
            format!("{}.ic-field", RULE),
            Severity::High,
            Location::section(format!("ics.{}", reference)),
            format!("IC {} is missing {}", reference, missing.join(", ")),
        ));
    }
    report.pass(format!("{} of {} ICs complete", complete, ics.len()));
}

fn check_components(db: &DesignDatabase, rules: &SchemaRules, report: &mut CheckReport) {
    let Some(components) = db.section_mapping("components") else {
        if db.has_section("components") {
            report.push(Violation::new(
                format!("{}.components-shape", RULE),
                Severity::Critical,
                Location::section("components"),
                "components must be a mapping of reference to component record",
            ));
        }
        return;
    };

    for (reference, entry) in sorted_entries(components) {
        let location = || Location::section(format!("components.{}", reference));

        if !has_field(entry, "value") {
            report.push(Violation::new(
                format!("{}.component-value", RULE),
                Severity::High,
                location(),
                format!("component {} has no value", reference),
            ));
        }

        let ic_ref = entry
            .as_mapping()
            .and_then(|m| m.get("ic"))
            .and_then(scalar_to_string);
        if let Some(ic_ref) = ic_ref {
            // Only an unreadable ics section can fail here; check_ics reports that.
            if let Ok(IcReference::Unknown) = db.resolve_ic_reference(&ic_ref, &rules.connector_refs) {
                report.push(
                    Violation::new(
                        format!("{}.unknown-ic", RULE),
                        Severity::Warn,
                        location(),
                        format!("component {} references unknown IC", reference),
                    )
                    .observed(&ic_ref),
                );
            }
        }

        let locked = entry
            .as_mapping()
            .and_then(|m| m.get("locked"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if locked && !has_field(entry, "calculation") && !has_field(entry, "description") {
            report.push(Violation::new(
                format!("{}.lock-justification", RULE),
                Severity::Warn,
                location(),
                format!("component {} is locked without calculation or description", reference),
            ));
        }
    }
    report.pass(format!("{} components checked", components.len()));
}

fn check_gpio(db: &DesignDatabase, rules: &SchemaRules, report: &mut CheckReport) {
    let Some(gpio) = db.section_mapping("gpio_pins") else {
        if db.has_section("gpio_pins") {
            report.push(Violation::new(
                format!("{}.gpio-shape", RULE),
                Severity::Critical,
                Location::section("gpio_pins"),
                "gpio_pins must be a mapping of GPIO<n> to pin record",
            ));
        }
        return;
    };

    let mut by_number: HashMap<u32, String> = HashMap::new();
    let mut by_function: HashMap<String, String> = HashMap::new();

    let mut entries: Vec<(String, Option<u32>, &Value)> = sorted_entries(gpio)
        .into_iter()
        .map(|(key, entry)| {
            let number = key
                .strip_prefix("GPIO")
                .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
                .and_then(|d| d.parse::<u32>().ok());
            (key, number, entry)
        })
        .collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    for (key, number, entry) in entries {
        let location = || Location::section(format!("gpio_pins.{}", key));

        let Some(number) = number else {
            report.push(
                Violation::new(
                    format!("{}.gpio-key", RULE),
                    Severity::High,
                    location(),
                    format!("GPIO key '{}' is not of the form GPIO<digits>", key),
                )
                .expected("GPIO<digits>"),
            );
            continue;
        };

        if let Some(first) = by_number.get(&number) {
            report.push(Violation::new(
                format!("{}.gpio-duplicate", RULE),
                Severity::High,
                location(),
                format!("GPIO{} declared twice ({} and {})", number, first, key),
            ));
        } else {
            by_number.insert(number, key.clone());
        }

        let missing = missing_fields(entry, &rules.required_gpio_fields);
        if !missing.is_empty() {
            report.push(Violation::new(
                format!("{}.gpio-field", RULE),
                Severity::High,
                location(),
                format!("{} is missing {}", key, missing.join(", ")),
            ));
        }

        let function = entry
            .as_mapping()
            .and_then(|m| m.get("function"))
            .and_then(scalar_to_string);
        if let Some(function) = function {
            if let Some(first) = by_function.get(&function) {
                report.push(Violation::new(
                    format!("{}.gpio-function-shared", RULE),
                    Severity::Warn,
                    location(),
                    format!("function {} is used by both {} and {}", function, first, key),
                ));
            } else {
                by_function.insert(function, key.clone());
            }
        }
    }
    report.pass(format!("{} GPIO entries checked", gpio.len()));
}

fn check_firmware_constants(db: &DesignDatabase, rules: &SchemaRules, report: &mut CheckReport) {
    let Some(constants) = db.section_mapping("firmware_constants") else {
        report.push(Violation::new(
            format!("{}.firmware-constants", RULE),
            Severity::Warn,
            Location::section("firmware_constants"),
            "no firmware constants defined",
        ));
        return;
    };
    let components = db.section_mapping("components");
    for link in &rules.constant_links {
        if !constants.contains_key(link.constant.as_str()) {
            continue;
        }
        let present = components.is_some_and(|c| c.contains_key(link.component.as_str()));
        if !present {
            report.push(Violation::new(
                format!("{}.constant-link", RULE),
                Severity::Warn,
                Location::section(format!("firmware_constants.{}", link.constant)),
                format!(
                    "{} is defined but component {} is missing",
                    link.constant, link.component
                ),
            ));
        }
    }
    report.pass(format!("{} firmware constants defined", constants.len()));
}
