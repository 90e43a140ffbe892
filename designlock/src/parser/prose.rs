//! Regex-scanned documentation text and Markdown tables.

use regex::Regex;
use serde::Serialize;

use crate::units::{normalize_as, sanitize_ascii, Quantity, Unit, ValueError};

/// One regex match on one line of prose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// 1-based line number.
    pub line: usize,
    /// Byte offset of the match within the line.
    pub column: usize,
    pub matched: String,
    /// Capture groups in order; `None` for groups that did not participate.
    pub groups: Vec<Option<String>>,
    /// The whole line the match came from.
    pub text: String,
}

impl Candidate {
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }
}

/// Every match of `pattern` on every line. Several matches on one line are
/// separate candidates.
pub fn scan_lines(text: &str, pattern: &Regex) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        for caps in pattern.captures_iter(line) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            candidates.push(Candidate {
                line: idx + 1,
                column: whole.start(),
                matched: whole.as_str().to_string(),
                groups: caps
                    .iter()
                    .skip(1)
                    .map(|g| g.map(|m| m.as_str().to_string()))
                    .collect(),
                text: line.to_string(),
            });
        }
    }
    candidates
}

const RANGE_SEPARATOR: char = '~';

/// Split a textual range such as `"0.75–1.00 V"`, `"0.75 → 1.00V"` or
/// `"200mV-750mV"` into normalized min and max.
///
/// En dash, em dash, the arrow glyph, `->` and `to` all act as the same
/// separator. A leading minus stays a sign. A bare number takes `unit`.
pub fn split_range(raw: &str, unit: Unit) -> Result<(Quantity, Quantity), ValueError> {
    let ascii = sanitize_ascii(raw).replace("->", &RANGE_SEPARATOR.to_string());
    let ascii = ascii.replace(" to ", &RANGE_SEPARATOR.to_string());

    let mut unified = String::with_capacity(ascii.len());
    let mut prev: Option<char> = None;
    let mut before_prev: Option<char> = None;
    for ch in ascii.chars() {
        let is_separator = ch == '-'
            && match prev {
                None | Some(RANGE_SEPARATOR) => false,
                Some('e') | Some('E') => !before_prev.is_some_and(|c| c.is_ascii_digit()),
                Some(_) => true,
            };
        unified.push(if is_separator { RANGE_SEPARATOR } else { ch });
        if !ch.is_whitespace() {
            before_prev = prev;
            prev = Some(ch);
        }
    }

    let parts: Vec<&str> = unified.split(RANGE_SEPARATOR).map(str::trim).collect();
    let [low, high] = parts.as_slice() else {
        return Err(ValueError::NotARange(raw.to_string()));
    };
    if low.is_empty() || high.is_empty() {
        return Err(ValueError::NotARange(raw.to_string()));
    }
    Ok((normalize_as(low, unit)?, normalize_as(high, unit)?))
}

/// One Markdown table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub line: usize,
    pub cells: Vec<String>,
}

impl TableRow {
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Rows of every pipe table in `text`, header rows included and `|---|`
/// separator rows dropped.
pub fn parse_markdown_table(text: &str) -> Vec<TableRow> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let trimmed = line.trim();
            if !trimmed.starts_with('|') {
                return None;
            }
            let inner = trimmed.trim_start_matches('|');
            let inner = inner.strip_suffix('|').unwrap_or(inner);
            let cells: Vec<String> = inner.split('|').map(|c| c.trim().to_string()).collect();
            if cells.iter().all(|c| is_separator_cell(c)) {
                return None;
            }
            Some(TableRow {
                line: idx + 1,
                cells,
            })
        })
        .collect()
}

fn is_separator_cell(cell: &str) -> bool {
    let body = cell.trim_start_matches(':').trim_end_matches(':');
    !body.is_empty() && body.chars().all(|c| c == '-')
}
