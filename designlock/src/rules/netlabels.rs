//! Net-label coverage: every power rail, GPIO function and physical net the
//! design needs must have a label.

use std::collections::BTreeSet;

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::NetLabelRules;
use crate::core::Project;
use crate::database::GpioAssignment;
use crate::parser::{parse_net_labels, NetLabel};

pub struct NetLabelChecker;

impl Checker for NetLabelChecker {
    fn id(&self) -> &'static str {
        "net-labels"
    }

    fn name(&self) -> &'static str {
        "Net labels"
    }

    fn description(&self) -> &'static str {
        "Power rails, GPIO functions and physical nets present in the net-label list"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let config = project.config();
        let db = project.load_database()?;
        let rails = db.power_rail_names()?;
        let gpio = db.gpio_pins()?;

        let labels_rel = &config.paths.net_labels;
        let text = project.read_required("net-label list", labels_rel)?;
        let labels_path = project.display_path(&project.resolve(labels_rel));
        let parsed = parse_net_labels(&text);

        let mut report =
            check_net_labels(&rails, &gpio.pins, &parsed.value, &labels_path, &config.netlabels);
        report.absorb_diagnostics(&labels_path, parsed.diagnostics);
        Ok(report)
    }
}

/// Rails, GPIO functions and the always-required nets, sorted.
pub fn required_nets(
    rails: &[String],
    pins: &[GpioAssignment],
    rules: &NetLabelRules,
) -> BTreeSet<String> {
    rails
        .iter()
        .cloned()
        .chain(pins.iter().filter_map(|p| p.function.clone()))
        .chain(rules.always_required.iter().cloned())
        .collect()
}

pub fn check_net_labels(
    rails: &[String],
    pins: &[GpioAssignment],
    labels: &[NetLabel],
    labels_path: &str,
    rules: &NetLabelRules,
) -> CheckReport {
    let mut report = CheckReport::new("net-labels", "Net labels");
    let required = required_nets(rails, pins, rules);
    let present: BTreeSet<&str> = labels.iter().map(|l| l.name.as_str()).collect();

    let mut found = 0;
    for name in &required {
        if present.contains(name.as_str()) {
            found += 1;
        } else {
            report.push(Violation::new(
                "net-labels.missing",
                Severity::High,
                Location::file(labels_path),
                format!("required net {} has no label", name),
            ));
        }
    }
    report.pass(format!("{} of {} required nets labelled", found, required.len()));

    let extras: Vec<&str> = present
        .iter()
        .copied()
        .filter(|name| !required.contains(*name))
        .collect();
    for name in extras.iter().take(rules.extra_display_limit) {
        report.push(Violation::new(
            "net-labels.extra",
            Severity::Info,
            Location::file(labels_path),
            format!("{} is labelled but not required", name),
        ));
    }
    if extras.len() > rules.extra_display_limit {
        report.push(Violation::new(
            "net-labels.extra",
            Severity::Info,
            Location::file(labels_path),
            format!("... and {} more", extras.len() - rules.extra_display_limit),
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_net_labels;

    fn pin(number: u32, function: &str) -> GpioAssignment {
        GpioAssignment {
            key: format!("GPIO{}", number),
            number,
            function: Some(function.to_string()),
            direction: None,
            peripheral: None,
            description: None,
        }
    }

    fn rules() -> NetLabelRules {
        NetLabelRules {
            always_required: vec!["GND".into()],
            extra_display_limit: 2,
        }
    }

    #[test]
    fn test_required_union() {
        let rails = vec!["VBAT".to_string(), "3V3".to_string()];
        let required = required_nets(&rails, &[pin(1, "ADC_BATTERY")], &rules());
        let names: Vec<_> = required.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["3V3", "ADC_BATTERY", "GND", "VBAT"]);
    }

    #[test]
    fn test_missing_nets_fail_in_sorted_order() {
        let labels = parse_net_labels("Net,Type,Description\nVBAT,power,battery\n").value;
        let rails = vec!["VBAT".to_string()];
        let report = check_net_labels(
            &rails,
            &[pin(4, "ADC_LADDER")],
            &labels,
            "hardware/Net_Labels.csv",
            &rules(),
        );
        let missing: Vec<_> = report
            .by_rule("net-labels.missing")
            .map(|v| v.reason.as_str())
            .collect();
        assert_eq!(
            missing,
            vec!["required net ADC_LADDER has no label", "required net GND has no label"]
        );
        assert!(!report.passed());
    }

    #[test]
    fn test_extras_are_informational_and_capped() {
        let labels =
            parse_net_labels("Net,Type\nGND,ground\nTP1,test\nTP2,test\nTP3,test\nTP4,test\n").value;
        let report = check_net_labels(&[], &[], &labels, "n.csv", &rules());
        assert!(report.passed());
        let extras: Vec<_> = report.by_rule("net-labels.extra").collect();
        assert_eq!(extras.len(), 3);
        assert_eq!(extras[2].reason, "... and 2 more");
        assert!(extras.iter().all(|v| v.severity == Severity::Info));
    }
}
