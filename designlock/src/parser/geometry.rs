//! Board outline and mounting holes from a `.kicad_pcb` file.
//!
//! Only two things are read. The outline is the `gr_rect` on `Edge.Cuts`,
//! or the bounding box of the `Edge.Cuts` line segments when the board edge
//! is drawn with lines. Mounting holes are footprints whose library id
//! contains a marker such as `MountingHole`, placed at the footprint's `at`
//! with the drill of their first drilled pad.

use serde::Serialize;
use thiserror::Error;

use super::sexp::{SExp, SExpError, SExpParser};

pub const EDGE_CUTS_LAYER: &str = "Edge.Cuts";

#[derive(Debug, Error)]
pub enum GeometryParseError {
    #[error("S-expression syntax error: {0}")]
    Syntax(#[from] SExpError),
    #[error("not a KiCad board file (root is '{0}')")]
    NotABoard(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutlineSource {
    Rectangle,
    LineBoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Outline {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub source: OutlineSource,
}

impl Outline {
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountingHole {
    pub reference: String,
    pub footprint: String,
    pub x: f64,
    pub y: f64,
    pub drill: Option<f64>,
}

impl MountingHole {
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardGeometry {
    pub outline: Option<Outline>,
    pub holes: Vec<MountingHole>,
}

/// Read outline and mounting holes. `hole_marker` is matched as a substring
/// of the footprint library id.
pub fn parse_board_geometry(
    text: &str,
    hole_marker: &str,
) -> Result<BoardGeometry, GeometryParseError> {
    let root = SExpParser::new(text).parse()?;
    if !root.is("kicad_pcb") {
        let found = root
            .head()
            .or_else(|| root.as_atom())
            .unwrap_or("?")
            .to_string();
        return Err(GeometryParseError::NotABoard(found));
    }

    let outline = find_rect_outline(&root).or_else(|| find_line_outline(&root));
    let holes: Vec<MountingHole> = root
        .find_all("footprint")
        .chain(root.find_all("module"))
        .filter_map(|fp| parse_hole(fp, hole_marker))
        .collect();

    tracing::debug!(
        "Board geometry: outline {:?}, {} mounting holes",
        outline.map(|o| (o.width(), o.height())),
        holes.len()
    );

    Ok(BoardGeometry { outline, holes })
}

fn on_edge_cuts(item: &SExp) -> bool {
    item.find("layer").and_then(|l| l.atom(1)) == Some(EDGE_CUTS_LAYER)
}

fn point(item: &SExp, key: &str) -> Option<(f64, f64)> {
    let node = item.find(key)?;
    Some((node.number(1)?, node.number(2)?))
}

fn find_rect_outline(root: &SExp) -> Option<Outline> {
    let rect = root.find_all("gr_rect").find(|r| on_edge_cuts(r))?;
    let (x0, y0) = point(rect, "start")?;
    let (x1, y1) = point(rect, "end")?;
    Some(Outline {
        x0,
        y0,
        x1,
        y1,
        source: OutlineSource::Rectangle,
    })
}

fn find_line_outline(root: &SExp) -> Option<Outline> {
    let mut points = Vec::new();
    for line in root.find_all("gr_line").filter(|l| on_edge_cuts(l)) {
        points.extend(point(line, "start"));
        points.extend(point(line, "end"));
    }
    let (first_x, first_y) = *points.first()?;
    let mut outline = Outline {
        x0: first_x,
        y0: first_y,
        x1: first_x,
        y1: first_y,
        source: OutlineSource::LineBoundingBox,
    };
    for (x, y) in points {
        outline.x0 = outline.x0.min(x);
        outline.y0 = outline.y0.min(y);
        outline.x1 = outline.x1.max(x);
        outline.y1 = outline.y1.max(y);
    }
    Some(outline)
}

fn parse_hole(footprint: &SExp, hole_marker: &str) -> Option<MountingHole> {
    let lib_id = footprint.atom(1)?;
    if !lib_id.contains(hole_marker) {
        return None;
    }
    let (x, y) = point(footprint, "at")?;
    Some(MountingHole {
        reference: footprint_reference(footprint).unwrap_or_default(),
        footprint: lib_id.to_string(),
        x,
        y,
        drill: footprint.find_all("pad").find_map(pad_drill),
    })
}

fn footprint_reference(footprint: &SExp) -> Option<String> {
    // KiCad 7+ uses (property "Reference" "H1"), older files (fp_text reference "H1").
    footprint
        .find_all("property")
        .find(|p| p.atom(1) == Some("Reference"))
        .or_else(|| {
            footprint
                .find_all("fp_text")
                .find(|t| t.atom(1) == Some("reference"))
        })
        .and_then(|node| node.atom(2))
        .map(str::to_string)
}

fn pad_drill(pad: &SExp) -> Option<f64> {
    let drill = pad.find("drill")?;
    if drill.atom(1) == Some("oval") {
        drill.number(2)
    } else {
        drill.number(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"(kicad_pcb (version 20221018) (generator pcbnew)
  (gr_rect (start 0 0) (end 80 50) (stroke (width 0.1) (type default)) (fill none) (layer "Edge.Cuts"))
  (gr_rect (start 10 10) (end 20 20) (layer "F.SilkS"))
  (footprint "MountingHole:MountingHole_3.2mm_M3" (layer "F.Cu") (at 4 4)
    (property "Reference" "H1" (at 0 -4.2 0) (layer "F.SilkS"))
    (pad "" np_thru_hole circle (at 0 0) (size 3.2 3.2) (drill 3.2) (layers "*.Cu" "*.Mask")))
  (footprint "MountingHole:MountingHole_3.2mm_M3" (layer "F.Cu") (at 76 46 90)
    (fp_text reference "H2" (at 0 -4.2) (layer "F.SilkS"))
    (pad "" np_thru_hole circle (at 0 0) (size 3.2 3.2) (drill 2.5) (layers "*.Cu" "*.Mask")))
  (footprint "Resistor_SMD:R_0603_1608Metric" (layer "F.Cu") (at 30 30)
    (pad "1" smd roundrect (at -0.8 0) (size 0.8 0.95) (layers "F.Cu")))
)"#;

    #[test]
    fn test_rect_outline_and_holes() {
        let board = parse_board_geometry(BOARD, "MountingHole").unwrap();
        let outline = board.outline.unwrap();
        assert_eq!(outline.source, OutlineSource::Rectangle);
        assert_eq!((outline.width(), outline.height()), (80.0, 50.0));

        assert_eq!(board.holes.len(), 2);
        assert_eq!(board.holes[0].reference, "H1");
        assert_eq!(board.holes[0].drill, Some(3.2));
        assert_eq!(board.holes[1].reference, "H2");
        assert_eq!((board.holes[1].x, board.holes[1].y), (76.0, 46.0));
        assert_eq!(board.holes[1].drill, Some(2.5));
    }

    #[test]
    fn test_line_outline_fallback() {
        let text = r#"(kicad_pcb
  (gr_line (start 0 0) (end 80 0) (layer "Edge.Cuts"))
  (gr_line (start 80 0) (end 80 50.05) (layer "Edge.Cuts"))
  (gr_line (start 80 50.05) (end 0 50.05) (layer "Edge.Cuts"))
  (gr_line (start 0 50.05) (end 0 0) (layer "Edge.Cuts"))
  (gr_line (start -5 -5) (end 200 200) (layer "F.SilkS")))"#;
        let board = parse_board_geometry(text, "MountingHole").unwrap();
        let outline = board.outline.unwrap();
        assert_eq!(outline.source, OutlineSource::LineBoundingBox);
        assert_eq!(outline.width(), 80.0);
        assert!((outline.height() - 50.05).abs() < 1e-9);
        assert!(board.holes.is_empty());
    }

    #[test]
    fn test_no_outline() {
        let board = parse_board_geometry("(kicad_pcb (version 1))", "MountingHole").unwrap();
        assert!(board.outline.is_none());
    }

    #[test]
    fn test_rejects_other_files() {
        assert!(matches!(
            parse_board_geometry("(kicad_sch (version 1))", "MountingHole"),
            Err(GeometryParseError::NotABoard(ref root)) if root == "kicad_sch"
        ));
        assert!(matches!(
            parse_board_geometry("(kicad_pcb", "MountingHole"),
            Err(GeometryParseError::Syntax(_))
        ));
    }

    #[test]
    fn test_hole_distance() {
        let hole = MountingHole {
            reference: "H1".into(),
            footprint: "MountingHole".into(),
            x: 4.0,
            y: 4.0,
            drill: Some(3.2),
        };
        assert_eq!(hole.distance_to(4.0, 5.0), 1.0);
        assert!(hole.distance_to(4.0, 5.01) > 1.0);
    }
}
