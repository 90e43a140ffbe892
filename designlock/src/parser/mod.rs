//! Value Parser: one reader per source format.
//!
//! - [`csv`]: BOM and net-label artifacts
//! - [`header`]: firmware header constants with alias resolution
//! - [`prose`]: regex scans over documentation lines and Markdown tables
//! - [`sexp`] + [`geometry`]: board outline and mounting holes from a KiCad board file
//!
//! Readers never abort a scan on a bad line; they collect a
//! [`LineDiagnostic`] and keep going.

pub mod csv;
pub mod geometry;
pub mod header;
pub mod prose;
pub mod sexp;

use serde::Serialize;

pub use csv::{parse_bom, parse_csv, parse_net_labels, BomRow, CsvRecord, CsvTable, NetLabel};
pub use geometry::{
    parse_board_geometry, BoardGeometry, GeometryParseError, MountingHole, Outline, OutlineSource,
};
pub use header::{ConstExpr, HeaderConstant, HeaderFile, Resolution};
pub use prose::{parse_markdown_table, scan_lines, split_range, Candidate, TableRow};
pub use sexp::{SExp, SExpParser, SExpError};

/// A recoverable problem on one line of an input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineDiagnostic {
    pub line: usize,
    pub message: String,
}

impl LineDiagnostic {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Parsed rows plus whatever was skipped on the way.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub value: T,
    pub diagnostics: Vec<LineDiagnostic>,
}
