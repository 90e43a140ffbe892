//! BOM completeness against each IC's required support components.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::BomRules;
use crate::core::Project;
use crate::database::{Component, Ic, IcRequirement};
use crate::parser::{parse_bom, BomRow};

pub struct BomCompletenessChecker;

impl Checker for BomCompletenessChecker {
    fn id(&self) -> &'static str {
        "bom-completeness"
    }

    fn name(&self) -> &'static str {
        "BOM completeness"
    }

    fn description(&self) -> &'static str {
        "Required and recommended support components of every IC present in the BOM"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let config = project.config();
        let db = project.load_database()?;
        let requirements = db.ic_requirements()?;
        let components: BTreeMap<String, Component> =
            db.section("components")?.unwrap_or_default();
        let ics: BTreeMap<String, Ic> = db.section("ics")?.unwrap_or_default();

        let bom_rel = &config.paths.bom;
        let text = project.read_required("BOM", bom_rel)?;
        let bom_path = project.display_path(&project.resolve(bom_rel));
        let parsed = parse_bom(&text);

        let mut report = check_bom_completeness(
            &requirements,
            &parsed.value,
            &components,
            &ics,
            &bom_path,
            &config.bom,
        );
        report.absorb_diagnostics(&bom_path, parsed.diagnostics);
        Ok(report)
    }
}

/// Outcome for one IC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IcCompleteness {
    pub ic_ref: String,
    pub part: String,
    pub description: String,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub recommended_missing: Vec<String>,
}

impl IcCompleteness {
    pub fn total(&self) -> usize {
        self.present.len() + self.missing.len()
    }

    pub fn complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Split each IC's required refs into present and missing, ICs sorted by
/// ref and refs in declaration order.
pub fn evaluate_requirements(
    requirements: &BTreeMap<String, IcRequirement>,
    bom_refs: &BTreeSet<&str>,
    ics: &BTreeMap<String, Ic>,
    rules: &BomRules,
) -> Vec<IcCompleteness> {
    requirements
        .iter()
        .map(|(ic_ref, requirement)| {
            let (present, missing): (Vec<String>, Vec<String>) = requirement
                .required
                .iter()
                .cloned()
                .partition(|r| bom_refs.contains(r.as_str()));

            let mut recommended: Vec<&String> = requirement.recommended.iter().collect();
            if let Some(extra) = rules.recommended.get(ic_ref) {
                recommended.extend(extra.iter().filter(|r| !requirement.recommended.contains(*r)));
            }
            let recommended_missing = recommended
                .into_iter()
                .filter(|r| !bom_refs.contains(r.as_str()))
                .cloned()
                .collect();

            IcCompleteness {
                ic_ref: ic_ref.clone(),
                part: ics
                    .get(ic_ref)
                    .and_then(|ic| ic.part.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                description: requirement
                    .description
                    .clone()
                    .unwrap_or_else(|| "Unknown IC".to_string()),
                present,
                missing,
                recommended_missing,
            }
        })
        .collect()
}

/// `value - description` (or part number) from the database.
pub fn component_summary(
    reference: &str,
    components: &BTreeMap<String, Component>,
    ics: &BTreeMap<String, Ic>,
) -> String {
    if let Some(component) = components.get(reference) {
        let parts: Vec<&str> = [
            component.value.as_deref(),
            component
                .description
                .as_deref()
                .or(component.part_number.as_deref()),
        ]
        .into_iter()
        .flatten()
        .collect();
        return if parts.is_empty() {
            "Component".to_string()
        } else {
            parts.join(" - ")
        };
    }
    if let Some(ic) = ics.get(reference) {
        return ic.part.clone().unwrap_or_else(|| "IC".to_string());
    }
    "(description not in database)".to_string()
}

pub fn check_bom_completeness(
    requirements: &BTreeMap<String, IcRequirement>,
    bom: &[BomRow],
    components: &BTreeMap<String, Component>,
    ics: &BTreeMap<String, Ic>,
    bom_path: &str,
    rules: &BomRules,
) -> CheckReport {
    let mut report = CheckReport::new("bom-completeness", "BOM completeness");
    let bom_refs: BTreeSet<&str> = bom.iter().map(|r| r.reference.trim()).collect();

    let results = evaluate_requirements(requirements, &bom_refs, ics, rules);
    for ic in &results {
        let location = Location::section(format!("ic_required_components.{}", ic.ic_ref));
        for reference in &ic.missing {
            report.push(
                Violation::new(
                    "bom-completeness.missing",
                    Severity::Critical,
                    location.clone(),
                    format!(
                        "{} ({}, {}) requires {}: {}",
                        ic.ic_ref,
                        ic.part,
                        ic.description,
                        reference,
                        component_summary(reference, components, ics)
                    ),
                )
                .expected(format!("{} row in {}", reference, bom_path)),
            );
        }
        for reference in &ic.recommended_missing {
            report.push(Violation::new(
                "bom-completeness.recommended",
                Severity::Warn,
                location.clone(),
                format!(
                    "{} ({}, {}) recommends {}: {}",
                    ic.ic_ref,
                    ic.part,
                    ic.description,
                    reference,
                    component_summary(reference, components, ics)
                ),
            ));
        }
        if ic.complete() {
            report.pass(format!(
                "{} ({}, {}): all {} required components present",
                ic.ic_ref,
                ic.part,
                ic.description,
                ic.total()
            ));
        }
    }

    let total: usize = results.iter().map(IcCompleteness::total).sum();
    tracing::debug!(
        "BOM completeness: {} ICs, {} required refs, {} BOM rows",
        results.len(),
        total,
        bom.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DesignDatabase;

    const DB: &str = r#"
ics:
  U1: {part: DRV8873HPWPR, manufacturer: TI, description: H-bridge}
components:
  C_VM: {value: 10uF, description: VM bulk}
  R_ILIM: {value: 1.58k, part_number: ERA-3AEB1581V}
ic_required_components:
  U1:
    description: Actuator driver
    required: [A, B, C]
    recommended: [C_VM]
"#;

    fn bom(refs: &[&str]) -> Vec<BomRow> {
        let mut text = String::from("Ref,Part Number,Qty,Description\n");
        for r in refs {
            text.push_str(&format!("{},P,1,d\n", r));
        }
        parse_bom(&text).value
    }

    fn check(refs: &[&str], rules: &BomRules) -> CheckReport {
        let db = DesignDatabase::from_yaml_str(DB).unwrap();
        check_bom_completeness(
            &db.ic_requirements().unwrap(),
            &bom(refs),
            &db.components().unwrap(),
            &db.ics().unwrap(),
            "hardware/BOM_Seed.csv",
            rules,
        )
    }

    #[test]
    fn test_exactly_one_missing_ref() {
        let report = check(&["A", "B", "C_VM"], &BomRules::default());
        let missing: Vec<_> = report.by_rule("bom-completeness.missing").collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].reason.contains("requires C"));
        assert!(missing[0].reason.contains("DRV8873HPWPR"));
        assert!(!report.passed());
    }

    #[test]
    fn test_violation_carries_ic_description() {
        let report = check(&["A", "C"], &BomRules::default());
        let missing = report.by_rule("bom-completeness.missing").next().unwrap();
        assert!(
            missing.reason.starts_with("U1 (DRV8873HPWPR, Actuator driver) requires B"),
            "{}",
            missing.reason
        );
        let recommended = report.by_rule("bom-completeness.recommended").next().unwrap();
        assert!(recommended.reason.contains("Actuator driver"));
    }

    #[test]
    fn test_evaluate_requirements() {
        let db = DesignDatabase::from_yaml_str(DB).unwrap();
        let refs: BTreeSet<&str> = ["A", "B"].into_iter().collect();
        let results = evaluate_requirements(
            &db.ic_requirements().unwrap(),
            &refs,
            &db.ics().unwrap(),
            &BomRules::default(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].missing, vec!["C"]);
        assert_eq!(results[0].present, vec!["A", "B"]);
        assert_eq!(results[0].total(), 3);
        assert_eq!(results[0].recommended_missing, vec!["C_VM"]);
    }

    #[test]
    fn test_recommended_refs_only_warn() {
        let mut rules = BomRules::default();
        rules.recommended.insert("U1".into(), vec!["R_ILIM".into()]);
        let report = check(&["A", "B", "C"], &rules);
        assert!(report.passed());
        let warnings: Vec<_> = report.by_rule("bom-completeness.recommended").collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].reason.ends_with("10uF - VM bulk"));
        assert!(warnings[1].reason.ends_with("1.58k - ERA-3AEB1581V"));
    }

    #[test]
    fn test_component_summary_fallbacks() {
        let db = DesignDatabase::from_yaml_str(DB).unwrap();
        let components = db.components().unwrap();
        let ics = db.ics().unwrap();
        assert_eq!(component_summary("U1", &components, &ics), "DRV8873HPWPR");
        assert_eq!(
            component_summary("ZZ", &components, &ics),
            "(description not in database)"
        );
    }
}
