//! Value normalization.
//!
//! Every value read from the design database, a CSV artifact, a header
//! constant or a documentation line is reduced to a [`Quantity`]: a number in
//! the canonical SI unit plus a unit tag. `"140k"`, `"140kΩ"` and `140000`
//! all normalize to `140000 Ohm`.
//!
//! Normalization is idempotent: `normalize_value(&q.to_string())` returns `q`
//! unchanged for every quantity produced here.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Absolute tolerance for voltage-band boundaries.
pub const VOLTAGE_TOLERANCE_V: f64 = 0.02;
/// Absolute tolerance for board outline width and height.
pub const OUTLINE_TOLERANCE_MM: f64 = 0.1;
/// Maximum distance between a declared and a placed mounting hole.
pub const HOLE_TOLERANCE_MM: f64 = 1.0;

// Absorbs binary rounding so that a value exactly on the tolerance edge passes.
const FLOAT_SLACK: f64 = 1e-9;
const RELATIVE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("empty value")]
    Empty,
    #[error("no numeric part in '{0}'")]
    NoNumber(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unknown unit suffix '{suffix}' in '{raw}'")]
    UnknownSuffix { raw: String, suffix: String },
    #[error("'{0}' is not a min-max range")]
    NotARange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Ohm,
    Farad,
    Henry,
    Volt,
    Ampere,
    Millimeter,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Ohm => "Ohm",
            Unit::Farad => "F",
            Unit::Henry => "H",
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::Millimeter => "mm",
        }
    }
}

/// A value in canonical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Same unit and numerically equal up to float noise.
    pub fn approx_eq(&self, other: &Quantity) -> bool {
        self.unit == other.unit && relative_eq(self.value, other.value)
    }

    /// Same unit and within an absolute tolerance expressed in that unit.
    pub fn within(&self, other: &Quantity, tolerance: f64) -> bool {
        self.unit == other.unit && within_tolerance(self.value, other.value, tolerance)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit.symbol())
    }
}

/// Suffix table, matched exactly against whatever follows the number.
const SUFFIXES: &[(&str, f64, Unit)] = &[
    ("R", 1.0, Unit::Ohm),
    ("r", 1.0, Unit::Ohm),
    ("m", 1e-3, Unit::Ohm),
    ("k", 1e3, Unit::Ohm),
    ("K", 1e3, Unit::Ohm),
    ("M", 1e6, Unit::Ohm),
    ("Meg", 1e6, Unit::Ohm),
    ("F", 1.0, Unit::Farad),
    ("mF", 1e-3, Unit::Farad),
    ("uF", 1e-6, Unit::Farad),
    ("u", 1e-6, Unit::Farad),
    ("nF", 1e-9, Unit::Farad),
    ("n", 1e-9, Unit::Farad),
    ("pF", 1e-12, Unit::Farad),
    ("p", 1e-12, Unit::Farad),
    ("H", 1.0, Unit::Henry),
    ("mH", 1e-3, Unit::Henry),
    ("uH", 1e-6, Unit::Henry),
    ("nH", 1e-9, Unit::Henry),
    ("V", 1.0, Unit::Volt),
    ("mV", 1e-3, Unit::Volt),
    ("kV", 1e3, Unit::Volt),
    ("A", 1.0, Unit::Ampere),
    ("mA", 1e-3, Unit::Ampere),
    ("uA", 1e-6, Unit::Ampere),
    ("mm", 1.0, Unit::Millimeter),
];

/// Normalize a component value. A bare number is taken as ohms.
pub fn normalize_value(raw: &str) -> Result<Quantity, ValueError> {
    normalize_as(raw, Unit::Ohm)
}

/// Normalize a value, reading a bare number in `default_unit`.
pub fn normalize_as(raw: &str, default_unit: Unit) -> Result<Quantity, ValueError> {
    let ascii = sanitize_ascii(raw);
    let compact: String = ascii.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ValueError::Empty);
    }
    let compact = strip_ohm_word(&compact);

    // "R47" style: leading R means the decimal point.
    if let Some(digits) = compact.strip_prefix('R') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            let value = parse_number(&format!("0.{}", digits))?;
            return Ok(Quantity::new(value, Unit::Ohm));
        }
    }

    let (number, rest) = split_number(compact);
    if number.is_empty() {
        return Err(ValueError::NoNumber(raw.to_string()));
    }

    if let Some((scale, fraction)) = rkm_infix(rest) {
        let value = parse_number(&format!("{}.{}", number, fraction))?;
        return Ok(Quantity::new(value * scale, Unit::Ohm));
    }

    let value = parse_number(number)?;
    if rest.is_empty() {
        return Ok(Quantity::new(value, default_unit));
    }

    SUFFIXES
        .iter()
        .find(|(suffix, _, _)| *suffix == rest)
        .map(|(_, scale, unit)| Quantity::new(value * scale, *unit))
        .ok_or_else(|| ValueError::UnknownSuffix {
            raw: raw.to_string(),
            suffix: rest.to_string(),
        })
}

fn strip_ohm_word(text: &str) -> &str {
    let lower = text.to_ascii_lowercase();
    for word in ["ohms", "ohm"] {
        if lower.ends_with(word) {
            return &text[..text.len() - word.len()];
        }
    }
    text
}

/// Split a leading decimal literal (sign, digits, point, exponent) from its suffix.
fn split_number(text: &str) -> (&str, &str) {
    let bytes = text.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if !bytes[..end].iter().any(|b| b.is_ascii_digit()) {
        return ("", text);
    }
    // Exponent only when a digit follows, so "1e" or "10mm" stay suffixes.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut probe = end + 1;
        if probe < bytes.len() && (bytes[probe] == b'-' || bytes[probe] == b'+') {
            probe += 1;
        }
        if probe < bytes.len() && bytes[probe].is_ascii_digit() {
            end = probe;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    text.split_at(end)
}

fn rkm_infix(rest: &str) -> Option<(f64, &str)> {
    let mut chars = rest.chars();
    let scale = match chars.next()? {
        'R' | 'r' => 1.0,
        'k' | 'K' => 1e3,
        'M' => 1e6,
        _ => return None,
    };
    let fraction = &rest[1..];
    if !fraction.is_empty() && fraction.chars().all(|c| c.is_ascii_digit()) {
        Some((scale, fraction))
    } else {
        None
    }
}

fn parse_number(text: &str) -> Result<f64, ValueError> {
    text.parse::<f64>()
        .map_err(|_| ValueError::InvalidNumber(text.to_string()))
}

pub fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance + FLOAT_SLACK
}

fn relative_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= scale * RELATIVE_EPSILON
}

/// Replace technical Unicode glyphs with ASCII equivalents.
///
/// Applied before any text comparison and before anything reaches the
/// console. Characters without a mapping become `?`.
pub fn sanitize_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
            continue;
        }
        match ch {
            '\u{2192}' => out.push_str("->"),
            '\u{00d7}' => out.push('x'),
            '\u{03a9}' | '\u{2126}' => out.push_str("Ohm"),
            '\u{00b5}' | '\u{03bc}' => out.push('u'),
            '\u{2264}' => out.push_str("<="),
            '\u{2265}' => out.push_str(">="),
            '\u{274c}' => out.push_str("[X]"),
            '\u{2705}' => out.push_str("[OK]"),
            '\u{26a0}' => out.push_str("[!]"),
            '\u{2713}' | '\u{2714}' => out.push_str("[v]"),
            '\u{00b0}' => out.push_str("deg"),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),
            '\u{00a0}' => out.push(' '),
            '\u{fe0f}' | '\u{feff}' => {}
            _ => out.push('?'),
        }
    }
    out
}

/// Parse a `"WxH"` board size (`"80x50"`, `"80 × 50 mm"`) into millimeters.
pub fn parse_board_size(raw: &str) -> Option<(f64, f64)> {
    let text = sanitize_ascii(raw).to_ascii_lowercase();
    let (w, h) = text.split_once('x')?;
    let dim = |s: &str| -> Option<f64> {
        let s = s.trim();
        let s = s.strip_suffix("mm").unwrap_or(s).trim();
        s.parse::<f64>().ok()
    };
    Some((dim(w)?, dim(h)?))
}
