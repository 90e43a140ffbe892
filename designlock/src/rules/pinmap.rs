//! GPIO assignment checks against the MCU's usable pins and the generated
//! firmware pin header.

use std::collections::{BTreeMap, HashSet};

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::PinMapRules;
use crate::core::Project;
use crate::database::GpioAssignment;
use crate::parser::{HeaderFile, Resolution};

pub struct PinMapChecker;

impl Checker for PinMapChecker {
    fn id(&self) -> &'static str {
        "pin-map"
    }

    fn name(&self) -> &'static str {
        "Pin map"
    }

    fn description(&self) -> &'static str {
        "GPIO range, reserved and strapping pins, conflicts, firmware pin header agreement"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let config = project.config();
        let db = project.load_database()?;
        let gpio = db.gpio_pins()?;

        let header_rel = &config.paths.pin_header;
        let text = project.read_required("pin header", header_rel)?;
        let header = HeaderFile::parse(&text);
        let header_path = project.display_path(&project.resolve(header_rel));

        let mut report = check_pin_map(&gpio.pins, &header, &header_path, &config.pinmap);
        for key in &gpio.invalid_keys {
            report.push(Violation::new(
                "pin-map.invalid-key",
                Severity::High,
                Location::section(format!("gpio_pins.{}", key)),
                format!("'{}' is not a GPIO<n> key", key),
            ));
        }
        report.absorb_diagnostics(&header_path, header.diagnostics.clone());
        Ok(report)
    }
}

/// `ADC_BATTERY` -> `kAdcBattery`.
pub fn firmware_symbol(function: &str) -> String {
    let mut out = String::from("k");
    for part in function.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }
    out
}

pub fn check_pin_map(
    pins: &[GpioAssignment],
    header: &HeaderFile,
    header_path: &str,
    rules: &PinMapRules,
) -> CheckReport {
    let mut report = CheckReport::new("pin-map", "Pin map");
    let mut used: BTreeMap<u32, &GpioAssignment> = BTreeMap::new();

    let mut ordered: Vec<&GpioAssignment> = pins.iter().collect();
    ordered.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.key.cmp(&b.key)));

    for pin in ordered.iter().copied() {
        let location = Location::section(format!("gpio_pins.{}", pin.key));
        let label = pin.function.as_deref().unwrap_or("<no function>");

        if pin.number < rules.valid_min || pin.number > rules.valid_max {
            report.push(
                Violation::new(
                    "pin-map.invalid-gpio",
                    Severity::Critical,
                    location,
                    format!("{}: GPIO{} does not exist", label, pin.number),
                )
                .expected(format!("GPIO{}..GPIO{}", rules.valid_min, rules.valid_max)),
            );
            continue;
        }

        if rules.reserved.contains(&pin.number) {
            report.push(Violation::new(
                "pin-map.reserved",
                Severity::Critical,
                location,
                format!("{}: GPIO{} is reserved for PSRAM", label, pin.number),
            ));
            continue;
        }

        if rules.strapping.contains(&pin.number) {
            report.push(Violation::new(
                "pin-map.strapping",
                Severity::Warn,
                location.clone(),
                format!("{}: GPIO{} is a strapping pin; check boot state", label, pin.number),
            ));
        }

        match used.get(&pin.number) {
            Some(first) => {
                report.push(Violation::new(
                    "pin-map.conflict",
                    Severity::Critical,
                    location,
                    format!(
                        "GPIO{} assigned to both {} ({}) and {} ({})",
                        pin.number,
                        first.function.as_deref().unwrap_or("<no function>"),
                        first.key,
                        label,
                        pin.key
                    ),
                ));
            }
            None => {
                used.insert(pin.number, pin);
            }
        }
    }
    report.pass(format!("{} GPIO assignments in range", used.len()));

    if header.is_empty() {
        report.push(Violation::new(
            "pin-map.header-empty",
            Severity::Critical,
            Location::file(header_path),
            "pin header defines no constants; regenerate it from the database",
        ));
        return report;
    }

    let consumed = compare_header(&ordered, header, header_path, &mut report);

    if rules.report_unused_constants {
        for constant in &header.constants {
            if consumed.contains(constant.name.as_str()) {
                continue;
            }
            let Some(value) = header.resolve_integer(&constant.name) else {
                continue;
            };
            report.push(
                Violation::new(
                    "pin-map.unused-constant",
                    Severity::Warn,
                    Location::line(header_path, constant.line),
                    format!("{} is not assigned in the database", constant.name),
                )
                .observed(value),
            );
        }
    }
    report
}

/// Match every database pin against the header, including pins already
/// reported as invalid, reserved or conflicting. Returns the names consumed,
/// alias chains included.
fn compare_header<'h>(
    pins: &[&GpioAssignment],
    header: &'h HeaderFile,
    header_path: &str,
    report: &mut CheckReport,
) -> HashSet<&'h str> {
    let mut consumed: HashSet<&'h str> = HashSet::new();
    let mut matched = 0;

    for pin in pins {
        let Some(function) = pin.function.as_deref() else {
            continue;
        };
        let location = Location::section(format!("gpio_pins.{}", pin.key));

        let candidates = [function.to_string(), firmware_symbol(function)];
        let found = candidates
            .iter()
            .map(|name| (name, header.resolve_detailed(name)))
            .find(|(_, resolution)| *resolution != Resolution::Undefined);

        let Some((name, resolution)) = found else {
            report.push(
                Violation::new(
                    "pin-map.header-missing",
                    Severity::High,
                    location,
                    format!("{} has no constant in the pin header", function),
                )
                .expected(format!("{} = {}", candidates[1], pin.number)),
            );
            continue;
        };

        let chain = match &resolution {
            Resolution::Resolved { chain, .. }
            | Resolution::Dangling { chain }
            | Resolution::Cycle { chain } => chain.clone(),
            Resolution::Undefined => Vec::new(),
        };
        for link in &chain {
            if let Some(constant) = header.get(link) {
                consumed.insert(constant.name.as_str());
            }
        }

        let line = header.get(name).map(|c| c.line);
        let header_location = match line {
            Some(line) => Location::line(header_path, line),
            None => Location::file(header_path),
        };

        match resolution {
            Resolution::Resolved { value, .. } if value == f64::from(pin.number) => matched += 1,
            Resolution::Resolved { value, .. } => report.push(
                Violation::new(
                    "pin-map.header-mismatch",
                    Severity::Critical,
                    header_location,
                    format!("{} disagrees with the database", name),
                )
                .observed(format!("GPIO{}", value))
                .expected(format!("GPIO{}", pin.number)),
            ),
            Resolution::Cycle { chain } => report.push(Violation::new(
                "pin-map.header-unresolved",
                Severity::High,
                header_location,
                format!("{} is defined in a cycle: {}", name, chain.join(" -> ")),
            )),
            Resolution::Dangling { chain } => report.push(Violation::new(
                "pin-map.header-unresolved",
                Severity::High,
                header_location,
                format!("{} refers to an undefined name: {}", name, chain.join(" -> ")),
            )),
            Resolution::Undefined => {}
        }
    }

    report.pass(format!("{} pins match the pin header", matched));
    consumed
}
