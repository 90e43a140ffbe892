//! Board outline and mounting holes in the PCB file against the database.

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::GeometryRules;
use crate::core::Project;
use crate::database::{HolePosition, Metadata};
use crate::parser::{parse_board_geometry, BoardGeometry, OutlineSource};
use crate::units::{parse_board_size, within_tolerance};

pub struct GeometryChecker;

impl Checker for GeometryChecker {
    fn id(&self) -> &'static str {
        "geometry"
    }

    fn name(&self) -> &'static str {
        "Board geometry"
    }

    fn description(&self) -> &'static str {
        "Edge.Cuts outline size and mounting-hole positions against the database"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let config = project.config();
        let db = project.load_database()?;
        let metadata = db.metadata()?;

        let pcb_rel = &config.paths.pcb;
        let text = project.read_required("PCB file", pcb_rel)?;
        let geometry = parse_board_geometry(&text, &config.geometry.hole_footprint).map_err(|e| {
            CheckError::Parse {
                path: project.resolve(pcb_rel),
                message: e.to_string(),
            }
        })?;
        let pcb_path = project.display_path(&project.resolve(pcb_rel));
        Ok(check_geometry(&metadata, &geometry, &pcb_path, &config.geometry))
    }
}

pub fn check_geometry(
    metadata: &Metadata,
    geometry: &BoardGeometry,
    pcb_path: &str,
    rules: &GeometryRules,
) -> CheckReport {
    let mut report = CheckReport::new("geometry", "Board geometry");
    check_outline(metadata, geometry, pcb_path, rules, &mut report);
    check_holes(&metadata.mounting_holes, geometry, pcb_path, rules, &mut report);
    report
}

fn check_outline(
    metadata: &Metadata,
    geometry: &BoardGeometry,
    pcb_path: &str,
    rules: &GeometryRules,
    report: &mut CheckReport,
) {
    let declared = metadata.board_size.as_deref().unwrap_or("");
    let Some((width, height)) = parse_board_size(declared) else {
        report.push(
            Violation::new(
                "geometry.board-size",
                Severity::High,
                Location::section("metadata.board_size"),
                "board size is missing or not WxH",
            )
            .observed(if declared.is_empty() { "<none>" } else { declared }),
        );
        return;
    };

    let Some(outline) = geometry.outline else {
        report.push(Violation::new(
            "geometry.outline-missing",
            Severity::Critical,
            Location::file(pcb_path),
            "no Edge.Cuts outline found",
        ));
        return;
    };

    let (w, h) = (outline.width(), outline.height());
    let source = match outline.source {
        OutlineSource::Rectangle => "rectangle",
        OutlineSource::LineBoundingBox => "line bounding box",
    };
    if within_tolerance(w, width, rules.outline_tolerance_mm)
        && within_tolerance(h, height, rules.outline_tolerance_mm)
    {
        report.pass(format!("outline {:.2} x {:.2} mm ({}) matches {}", w, h, source, declared));
    } else {
        report.push(
            Violation::new(
                "geometry.outline-size",
                Severity::Critical,
                Location::file(pcb_path),
                format!(
                    "outline differs from the database by more than {} mm",
                    rules.outline_tolerance_mm
                ),
            )
            .observed(format!("{:.2} x {:.2} mm", w, h))
            .expected(format!("{} x {} mm", width, height)),
        );
    }
}

fn check_holes(
    declared: &[HolePosition],
    geometry: &BoardGeometry,
    pcb_path: &str,
    rules: &GeometryRules,
    report: &mut CheckReport,
) {
    if let Some(expected) = rules.expected_hole_count {
        if declared.len() != expected {
            report.push(
                Violation::new(
                    "geometry.declared-hole-count",
                    Severity::Medium,
                    Location::section("metadata.mounting_holes"),
                    "database hole count differs from the frozen count",
                )
                .observed(declared.len())
                .expected(expected),
            );
        }
    }

    if geometry.holes.len() != declared.len() {
        report.push(
            Violation::new(
                "geometry.hole-count",
                Severity::Critical,
                Location::file(pcb_path),
                "PCB and database disagree on the number of mounting holes",
            )
            .observed(geometry.holes.len())
            .expected(declared.len()),
        );
    }

    let mut matched = 0;
    for (idx, hole) in declared.iter().enumerate() {
        let nearest = geometry
            .holes
            .iter()
            .map(|h| h.distance_to(hole.x, hole.y))
            .min_by(f64::total_cmp);
        match nearest {
            Some(d) if within_tolerance(d, 0.0, rules.hole_tolerance_mm) => matched += 1,
            other => {
                let mut violation = Violation::new(
                    "geometry.hole-position",
                    Severity::Critical,
                    Location::section(format!("metadata.mounting_holes[{}]", idx)),
                    format!(
                        "no PCB mounting hole within {} mm of ({}, {})",
                        rules.hole_tolerance_mm, hole.x, hole.y
                    ),
                );
                if let Some(d) = other {
                    violation = violation.observed(format!("nearest {:.2} mm away", d));
                }
                report.push(violation);
            }
        }
    }
    if !declared.is_empty() {
        report.pass(format!("{} of {} mounting holes placed", matched, declared.len()));
    }

    if let Some(drill) = rules.expected_drill_mm {
        for hole in &geometry.holes {
            let ok = hole
                .drill
                .is_some_and(|d| within_tolerance(d, drill, 0.01));
            if !ok {
                let mut violation = Violation::new(
                    "geometry.drill",
                    Severity::Warn,
                    Location::file(pcb_path),
                    format!("mounting hole {} has an unexpected drill", hole.reference),
                )
                .expected(format!("{} mm", drill));
                violation = match hole.drill {
                    Some(d) => violation.observed(format!("{} mm", d)),
                    None => violation.observed("no drill"),
                };
                report.push(violation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{MountingHole, Outline};

    fn metadata(holes: &[(f64, f64)]) -> Metadata {
        Metadata {
            board_size: Some("80x50".into()),
            mounting_holes: holes.iter().map(|&(x, y)| HolePosition { x, y }).collect(),
            ..Default::default()
        }
    }

    fn board(width: f64, height: f64, holes: &[(f64, f64)]) -> BoardGeometry {
        BoardGeometry {
            outline: Some(Outline {
                x0: 0.0,
                y0: 0.0,
                x1: width,
                y1: height,
                source: OutlineSource::Rectangle,
            }),
            holes: holes
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| MountingHole {
                    reference: format!("H{}", i + 1),
                    footprint: "MountingHole:MountingHole_3.2mm_M3".into(),
                    x,
                    y,
                    drill: Some(3.2),
                })
                .collect(),
        }
    }

    const HOLES: [(f64, f64); 4] = [(4.0, 4.0), (76.0, 4.0), (4.0, 46.0), (76.0, 46.0)];

    fn check(meta: &Metadata, geometry: &BoardGeometry) -> CheckReport {
        check_geometry(meta, geometry, "hardware/SEDU_PCB.kicad_pcb", &GeometryRules::default())
    }

    #[test]
    fn test_outline_tolerance() {
        let meta = metadata(&HOLES);
        assert!(check(&meta, &board(80.05, 50.0, &HOLES)).violations.is_empty());

        let report = check(&meta, &board(80.2, 50.0, &HOLES));
        let v = report.by_rule("geometry.outline-size").next().unwrap();
        assert_eq!(v.observed.as_deref(), Some("80.20 x 50.00 mm"));
        assert!(!report.passed());
    }

    #[test]
    fn test_hole_distance_boundary() {
        let meta = metadata(&HOLES);
        let mut placed = HOLES;
        placed[0] = (5.0, 4.0);
        assert!(check(&meta, &board(80.0, 50.0, &placed)).passed());

        placed[0] = (5.01, 4.0);
        let report = check(&meta, &board(80.0, 50.0, &placed));
        let v: Vec<_> = report.by_rule("geometry.hole-position").collect();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].location, Location::section("metadata.mounting_holes[0]"));
    }

    #[test]
    fn test_hole_count_mismatch() {
        let meta = metadata(&HOLES);
        let report = check(&meta, &board(80.0, 50.0, &HOLES[..3]));
        assert_eq!(report.by_rule("geometry.hole-count").count(), 1);
        // The fourth declared hole has nothing within 1 mm.
        assert_eq!(report.by_rule("geometry.hole-position").count(), 1);

        let report = check(&metadata(&HOLES[..3]), &board(80.0, 50.0, &HOLES[..3]));
        let v = report.by_rule("geometry.declared-hole-count").next().unwrap();
        assert_eq!(v.severity, Severity::Medium);
    }

    #[test]
    fn test_missing_outline_and_bad_board_size() {
        let meta = metadata(&HOLES);
        let mut geometry = board(80.0, 50.0, &HOLES);
        geometry.outline = None;
        assert_eq!(check(&meta, &geometry).by_rule("geometry.outline-missing").count(), 1);

        let mut meta = metadata(&HOLES);
        meta.board_size = Some("big".into());
        assert_eq!(
            check(&meta, &board(80.0, 50.0, &HOLES)).by_rule("geometry.board-size").count(),
            1
        );
    }

    #[test]
    fn test_drill_mismatch_is_warning() {
        let meta = metadata(&HOLES);
        let mut geometry = board(80.0, 50.0, &HOLES);
        geometry.holes[2].drill = Some(2.5);
        let report = check(&meta, &geometry);
        let v = report.by_rule("geometry.drill").next().unwrap();
        assert_eq!(v.severity, Severity::Warn);
        assert!(report.passed());
    }
}
