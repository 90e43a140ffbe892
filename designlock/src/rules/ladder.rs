//! Button-ladder voltage bands.
//!
//! Eight boundaries, in axis order: fault_low, START min/max, IDLE min/max,
//! STOP min/max, fault_high. The database is the reference; the firmware
//! source must mirror each boundary within tolerance. Ordering and the
//! hysteresis gaps are checked on the database values.

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::{LadderRules, LadderSymbols};
use crate::core::Project;
use crate::database::{ButtonLadder, DatabaseError};
use crate::parser::{parse_markdown_table, split_range, HeaderFile, Resolution, TableRow};
use crate::units::{within_tolerance, Unit};

pub const BOUNDARIES: [&str; 8] = [
    "fault_low",
    "start_min",
    "start_max",
    "idle_min",
    "idle_max",
    "stop_min",
    "stop_max",
    "fault_high",
];

const BANDS: [&str; 3] = ["START", "IDLE", "STOP"];

pub struct VoltageBandChecker;

impl Checker for VoltageBandChecker {
    fn id(&self) -> &'static str {
        "voltage-bands"
    }

    fn name(&self) -> &'static str {
        "Voltage bands"
    }

    fn description(&self) -> &'static str {
        "Button-ladder thresholds: database vs firmware, ordering, hysteresis gaps"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let config = project.config();
        let rules = &config.ladder;
        let db = project.load_database()?;
        let boundaries = LadderBoundaries::from_database(&db.button_ladder()?)?;

        let fw_rel = &config.paths.ladder_source;
        let text = project.read_required("ladder firmware source", fw_rel)?;
        let firmware = HeaderFile::parse(&text);
        let fw_path = project.display_path(&project.resolve(fw_rel));

        let mut report = check_ladder(&boundaries, &firmware, &fw_path, rules);
        report.absorb_diagnostics(&fw_path, firmware.diagnostics.clone());

        if rules.check_docs_table {
            if let Some(doc) = project.read_optional(&config.paths.ladder_doc)? {
                let doc_path = project.display_path(&project.resolve(&config.paths.ladder_doc));
                check_docs_table(&boundaries, &parse_markdown_table(&doc), &doc_path, rules, &mut report);
            }
        }
        Ok(report)
    }
}

/// The eight boundaries in axis order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderBoundaries {
    values: [f64; 8],
}

impl LadderBoundaries {
    pub fn new(values: [f64; 8]) -> Self {
        Self { values }
    }

    pub fn from_database(ladder: &ButtonLadder) -> Result<Self, DatabaseError> {
        let band = |name: &str| {
            ladder.bands.get(name).ok_or_else(|| DatabaseError::MalformedSection {
                section: "button_ladder".into(),
                message: format!("band {} is not defined", name),
            })
        };
        let (start, idle, stop) = (band("START")?, band("IDLE")?, band("STOP")?);
        Ok(Self::new([
            ladder.fault_low_threshold,
            start.voltage_min,
            start.voltage_max,
            idle.voltage_min,
            idle.voltage_max,
            stop.voltage_min,
            stop.voltage_max,
            ladder.fault_high_threshold,
        ]))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        BOUNDARIES
            .iter()
            .position(|b| *b == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        BOUNDARIES.iter().copied().zip(self.values.iter().copied())
    }

    /// `(min, max)` of a named band.
    pub fn band(&self, name: &str) -> Option<(f64, f64)> {
        let lower = name.to_ascii_lowercase();
        Some((self.get(&format!("{}_min", lower))?, self.get(&format!("{}_max", lower))?))
    }
}

fn symbol<'a>(symbols: &'a LadderSymbols, boundary: &str) -> &'a str {
    match boundary {
        "fault_low" => &symbols.fault_low,
        "start_min" => &symbols.start_min,
        "start_max" => &symbols.start_max,
        "idle_min" => &symbols.idle_min,
        "idle_max" => &symbols.idle_max,
        "stop_min" => &symbols.stop_min,
        "stop_max" => &symbols.stop_max,
        _ => &symbols.fault_high,
    }
}

pub fn check_ladder(
    database: &LadderBoundaries,
    firmware: &HeaderFile,
    firmware_path: &str,
    rules: &LadderRules,
) -> CheckReport {
    let mut report = CheckReport::new("voltage-bands", "Voltage bands");
    compare_firmware(database, firmware, firmware_path, rules, &mut report);
    check_ordering(database, rules, &mut report);
    check_gaps(database, rules, &mut report);
    report
}

fn compare_firmware(
    database: &LadderBoundaries,
    firmware: &HeaderFile,
    firmware_path: &str,
    rules: &LadderRules,
    report: &mut CheckReport,
) {
    let mut agreed = 0;
    for (name, expected) in database.iter() {
        let sym = symbol(&rules.symbols, name);
        let location = match firmware.get(sym) {
            Some(constant) => Location::line(firmware_path, constant.line),
            None => Location::file(firmware_path),
        };
        match firmware.resolve_detailed(sym) {
            Resolution::Resolved { value, .. } => {
                if within_tolerance(value, expected, rules.tolerance_v) {
                    agreed += 1;
                } else {
                    report.push(
                        Violation::new(
                            "voltage-bands.mismatch",
                            Severity::Critical,
                            location,
                            format!("{} ({}) differs from the database", sym, name),
                        )
                        .observed(format!("{:.2} V", value))
                        .expected(format!("{:.2} V +/- {} V", expected, rules.tolerance_v)),
                    );
                }
            }
            Resolution::Undefined => report.push(
                Violation::new(
                    "voltage-bands.firmware-missing",
                    Severity::High,
                    location,
                    format!("{} is not defined in firmware", sym),
                )
                .expected(format!("{:.2} V", expected)),
            ),
            Resolution::Dangling { chain } | Resolution::Cycle { chain } => report.push(
                Violation::new(
                    "voltage-bands.firmware-unresolved",
                    Severity::High,
                    location,
                    format!("{} cannot be resolved: {}", sym, chain.join(" -> ")),
                ),
            ),
        }
    }
    if agreed == BOUNDARIES.len() {
        report.pass(format!(
            "database matches firmware (+/- {} V)",
            rules.tolerance_v
        ));
    }
}

fn pair_listed(pairs: &[(String, String)], a: &str, b: &str) -> bool {
    pairs.iter().any(|(x, y)| x == a && y == b)
}

fn check_ordering(database: &LadderBoundaries, rules: &LadderRules, report: &mut CheckReport) {
    let mut ordered = true;
    for window in BOUNDARIES.windows(2) {
        let (a, b) = (window[0], window[1]);
        let (va, vb) = (database.get(a).unwrap_or(f64::NAN), database.get(b).unwrap_or(f64::NAN));
        let equal_ok = pair_listed(&rules.equal_allowed, a, b);
        let holds = if equal_ok { va <= vb } else { va < vb };
        if !holds {
            ordered = false;
            let op = if equal_ok { "<=" } else { "<" };
            report.push(
                Violation::new(
                    "voltage-bands.ordering",
                    Severity::Critical,
                    Location::section("button_ladder"),
                    format!("expected {} {} {}", a, op, b),
                )
                .observed(format!("{:.2} V vs {:.2} V", va, vb)),
            );
        }
    }
    if ordered {
        report.pass("boundaries increase monotonically");
    }
}

fn check_gaps(database: &LadderBoundaries, rules: &LadderRules, report: &mut CheckReport) {
    for (a, b) in &rules.required_gaps {
        let (Some(va), Some(vb)) = (database.get(a), database.get(b)) else {
            report.push(Violation::new(
                "voltage-bands.gap",
                Severity::High,
                Location::section("button_ladder"),
                format!("unknown boundary in gap rule {} / {}", a, b),
            ));
            continue;
        };
        if vb > va {
            report.pass(format!("gap {} -> {}: {:.2} V", a, b, vb - va));
        } else {
            report.push(
                Violation::new(
                    "voltage-bands.gap",
                    Severity::Critical,
                    Location::section("button_ladder"),
                    format!("no hysteresis gap between {} and {}", a, b),
                )
                .observed(format!("{:.2} V >= {:.2} V", va, vb)),
            );
        }
    }
}

/// Compare `| BAND | min-max V |` rows of the ladder documentation. Rows
/// for unknown bands and cells without a range are ignored.
pub fn check_docs_table(
    database: &LadderBoundaries,
    rows: &[TableRow],
    doc_path: &str,
    rules: &LadderRules,
    report: &mut CheckReport,
) {
    let mut compared = 0;
    for row in rows {
        let band = row.cell(0).trim_matches('*').trim().to_ascii_uppercase();
        if !BANDS.contains(&band.as_str()) {
            continue;
        }
        let Some((min, max)) = database.band(&band) else {
            continue;
        };
        let Some((low, high)) = row.cells.iter().skip(1).find_map(|c| split_range(c, Unit::Volt).ok())
        else {
            continue;
        };
        compared += 1;
        if low.unit != Unit::Volt
            || !within_tolerance(low.value, min, rules.tolerance_v)
            || !within_tolerance(high.value, max, rules.tolerance_v)
        {
            report.push(
                Violation::new(
                    "voltage-bands.docs",
                    Severity::Warn,
                    Location::line(doc_path, row.line),
                    format!("documented {} band differs from the database", band),
                )
                .observed(format!("{:.2}-{:.2} V", low.value, high.value))
                .expected(format!("{:.2}-{:.2} V", min, max)),
            );
        }
    }
    tracing::debug!("Compared {} documented ladder bands", compared);
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: [f64; 8] = [0.20, 0.75, 1.00, 1.55, 2.10, 2.65, 3.20, 3.20];

    fn firmware(values: &[f64; 8]) -> HeaderFile {
        let symbols = LadderSymbols::default();
        let text: String = BOUNDARIES
            .iter()
            .zip(values)
            .map(|(b, v)| format!("static constexpr float {} = {:.2}f;\n", symbol(&symbols, b), v))
            .collect();
        HeaderFile::parse(&text)
    }

    fn check(db: [f64; 8], fw: [f64; 8]) -> CheckReport {
        check_ladder(
            &LadderBoundaries::new(db),
            &firmware(&fw),
            "firmware/src/input_ladder.cpp",
            &LadderRules::default(),
        )
    }

    #[test]
    fn test_agreeing_sources_pass() {
        let mut fw = VALUES;
        fw[3] += 0.02;
        let report = check(VALUES, fw);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
    }

    #[test]
    fn test_each_perturbed_boundary_reports_exactly_one_mismatch() {
        for i in 0..8 {
            let mut fw = VALUES;
            fw[i] += 0.05;
            let report = check(VALUES, fw);
            let mismatches: Vec<_> = report.by_rule("voltage-bands.mismatch").collect();
            assert_eq!(mismatches.len(), 1, "boundary {}", BOUNDARIES[i]);
            assert!(mismatches[0].reason.contains(BOUNDARIES[i]));
        }
    }

    #[test]
    fn test_ordering_allows_only_the_listed_equal_pair() {
        let mut db = VALUES;
        db[2] = db[1];
        let report = check(db, db);
        let ordering: Vec<_> = report.by_rule("voltage-bands.ordering").collect();
        assert_eq!(ordering.len(), 1);
        assert!(ordering[0].reason.contains("start_min < start_max"));

        let mut db = VALUES;
        db[7] = 3.0;
        let report = check(db, db);
        assert!(report.by_rule("voltage-bands.ordering").next().unwrap().reason.contains("<="));
    }

    #[test]
    fn test_gap_violation() {
        let mut db = VALUES;
        db[3] = db[2];
        let report = check(db, db);
        assert_eq!(report.by_rule("voltage-bands.gap").count(), 1);
        // idle_min == start_max also breaks strict ordering.
        assert_eq!(report.by_rule("voltage-bands.ordering").count(), 1);
    }

    #[test]
    fn test_aliases_and_missing_symbols() {
        let mut text = String::new();
        for (b, v) in BOUNDARIES.iter().zip(VALUES).skip(1) {
            text.push_str(&format!("constexpr float {} = {}f;\n", symbol(&LadderSymbols::default(), b), v));
        }
        text = text.replace("kLadderFaultHigh = 3.2f", "kLadderFaultHigh = kLadderStopMax");
        let report = check_ladder(
            &LadderBoundaries::new(VALUES),
            &HeaderFile::parse(&text),
            "fw.cpp",
            &LadderRules::default(),
        );
        assert_eq!(report.by_rule("voltage-bands.firmware-missing").count(), 1);
        assert_eq!(report.by_rule("voltage-bands.mismatch").count(), 0);
    }

    #[test]
    fn test_from_database_requires_all_bands() {
        let db = crate::database::DesignDatabase::from_yaml_str(
            "button_ladder:\n  fault_low_threshold: 0.2\n  fault_high_threshold: 3.2\n  bands:\n    START: {voltage_min: 0.75, voltage_max: 1.0}\n",
        )
        .unwrap();
        assert!(matches!(
            LadderBoundaries::from_database(&db.button_ladder().unwrap()),
            Err(DatabaseError::MalformedSection { .. })
        ));
    }

    #[test]
    fn test_docs_table_mismatch_is_warning() {
        let doc = "| Band | Range |\n|---|---|\n| START | 0.75–1.00 V |\n| IDLE | 1.50 → 2.10 V |\n| STOP | 2.65-3.20 |\n";
        let mut report = CheckReport::new("voltage-bands", "Voltage bands");
        check_docs_table(
            &LadderBoundaries::new(VALUES),
            &parse_markdown_table(doc),
            "docs/Button_Ladder.md",
            &LadderRules::default(),
            &mut report,
        );
        let docs: Vec<_> = report.by_rule("voltage-bands.docs").collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].location, Location::line("docs/Button_Ladder.md", 4));
        assert_eq!(docs[0].severity, Severity::Warn);
    }
}
