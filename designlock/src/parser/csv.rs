//! CSV artifacts.
//!
//! The first record names the fields. Later records identical to the header
//! are skipped (generators sometimes append a second header when files are
//! concatenated), a column absent from a record reads as `""`, and a record
//! with more fields than the header keeps the named ones and gets a
//! diagnostic.

use std::collections::HashMap;

use super::{LineDiagnostic, Parsed};

#[derive(Debug, Clone, Default)]
pub struct CsvRecord {
    /// 1-based line the record starts on.
    pub line: usize,
    fields: HashMap<String, String>,
}

impl CsvRecord {
    /// Field by column name; empty when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }

    /// First non-empty field among several candidate column names.
    pub fn get_any(&self, columns: &[&str]) -> &str {
        columns
            .iter()
            .map(|c| self.get(c))
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub records: Vec<CsvRecord>,
    pub diagnostics: Vec<LineDiagnostic>,
}

pub fn parse_csv(text: &str) -> CsvTable {
    let (raw_records, mut diagnostics) = split_records(text);
    let mut iter = raw_records.into_iter();

    let headers: Vec<String> = match iter.next() {
        Some((_, fields)) => fields,
        None => {
            return CsvTable {
                diagnostics,
                ..Default::default()
            }
        }
    };

    let mut records = Vec::new();
    for (line, fields) in iter {
        if fields == headers {
            continue;
        }
        if fields.len() > headers.len() {
            diagnostics.push(LineDiagnostic::new(
                line,
                format!(
                    "{} fields but header has {}; extra fields ignored",
                    fields.len(),
                    headers.len()
                ),
            ));
        }
        let fields = headers
            .iter()
            .cloned()
            .zip(fields)
            .collect::<HashMap<_, _>>();
        records.push(CsvRecord { line, fields });
    }

    tracing::debug!(
        "Parsed CSV: {} columns, {} records, {} diagnostics",
        headers.len(),
        records.len(),
        diagnostics.len()
    );

    CsvTable {
        headers,
        records,
        diagnostics,
    }
}

/// Tokenize into records of trimmed fields, honoring quoted fields that
/// contain commas, doubled quotes or newlines.
fn split_records(text: &str) -> (Vec<(usize, Vec<String>)>, Vec<LineDiagnostic>) {
    let mut records = Vec::new();
    let mut diagnostics = Vec::new();

    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;

    let mut push_record = |fields: Vec<String>, at: usize| {
        let blank = fields.len() == 1 && fields[0].is_empty();
        if !blank {
            records.push((at, fields));
        }
    };

    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' => fields.push(field.trim().to_string()),
            '\r' => {}
            '\n' => {
                fields.push(field.trim().to_string());
                push_record(std::mem::take(&mut fields), record_line);
                line += 1;
                record_line = line;
            }
            _ => {
                field.push(ch);
                continue;
            }
        }
        if ch == ',' || ch == '\n' {
            field.clear();
        }
    }

    if in_quotes {
        diagnostics.push(LineDiagnostic::new(record_line, "unterminated quoted field"));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field.trim().to_string());
        push_record(fields, record_line);
    }

    (records, diagnostics)
}

/// One BOM line (`Ref,Part Number,Qty,Description`).
#[derive(Debug, Clone, PartialEq)]
pub struct BomRow {
    pub reference: String,
    pub part_number: String,
    pub qty: String,
    pub description: String,
    pub line: usize,
}

pub fn parse_bom(text: &str) -> Parsed<Vec<BomRow>> {
    let table = parse_csv(text);
    let rows = table
        .records
        .iter()
        .filter(|r| !r.get("Ref").is_empty())
        .map(|r| BomRow {
            reference: r.get("Ref").to_string(),
            part_number: r.get("Part Number").to_string(),
            qty: r.get("Qty").to_string(),
            description: r.get("Description").to_string(),
            line: r.line,
        })
        .collect();
    Parsed {
        value: rows,
        diagnostics: table.diagnostics,
    }
}

/// One net-label line (`Net,Type,Description`).
#[derive(Debug, Clone, PartialEq)]
pub struct NetLabel {
    pub name: String,
    pub kind: String,
    pub description: String,
    pub line: usize,
}

pub fn parse_net_labels(text: &str) -> Parsed<Vec<NetLabel>> {
    let table = parse_csv(text);
    let rows = table
        .records
        .iter()
        .filter_map(|r| {
            let name = r.get_any(&["Net", "net", "label"]);
            if name.is_empty() {
                return None;
            }
            Some(NetLabel {
                name: name.to_string(),
                kind: r.get_any(&["Type", "type"]).to_string(),
                description: r.get_any(&["Description", "description"]).to_string(),
                line: r.line,
            })
        })
        .collect();
    Parsed {
        value: rows,
        diagnostics: table.diagnostics,
    }
}
