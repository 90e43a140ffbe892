//! Firmware header constants.
//!
//! Reads `#define NAME VALUE` lines and `[qualifiers] [type] name = VALUE;`
//! assignments. A value is a numeric literal with an optional suffix
//! (`0.20f`, `19u`, `0x13`) or the name of another constant. Aliases are
//! resolved by following the chain with a visited set: a name met twice is a
//! cycle and resolves to nothing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::LineDiagnostic;

static DEFINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*define\s+([A-Za-z_]\w*)\s+(\S.*?)\s*$").expect("define pattern")
});

static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\s*=\s*([^=;][^;]*?)\s*;").expect("assignment pattern")
});

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([-+]?(?:0[xX][0-9a-fA-F]+|\d+\.?\d*(?:[eE][-+]?\d+)?|\.\d+(?:[eE][-+]?\d+)?))([fFuUlL]{0,3})$",
    )
    .expect("number pattern")
});

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w:]*$").expect("identifier pattern"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstExpr {
    Number(f64),
    Alias(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderConstant {
    pub name: String,
    pub expr: ConstExpr,
    pub line: usize,
    /// Literal suffix as written (`f`, `u`, `UL`), if any.
    pub suffix: Option<String>,
}

/// Outcome of following a name through its aliases.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved { value: f64, chain: Vec<String> },
    Undefined,
    /// The chain ends at a name that is never defined.
    Dangling { chain: Vec<String> },
    Cycle { chain: Vec<String> },
}

#[derive(Debug, Clone, Default)]
pub struct HeaderFile {
    pub constants: Vec<HeaderConstant>,
    pub diagnostics: Vec<LineDiagnostic>,
    index: HashMap<String, usize>,
}

impl HeaderFile {
    pub fn parse(text: &str) -> Self {
        let mut file = HeaderFile::default();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comments(raw_line);
            if line.trim().is_empty() {
                continue;
            }

            if let Some(caps) = DEFINE_RE.captures(&line) {
                file.add(&caps[1], &caps[2], line_no);
                continue;
            }

            for caps in ASSIGN_RE.captures_iter(&line) {
                file.add(&caps[1], &caps[2], line_no);
            }
        }

        tracing::debug!(
            "Parsed header: {} constants, {} diagnostics",
            file.constants.len(),
            file.diagnostics.len()
        );
        file
    }

    fn add(&mut self, name: &str, rhs: &str, line: usize) {
        let Some((expr, suffix)) = classify(rhs) else {
            self.diagnostics.push(LineDiagnostic::new(
                line,
                format!("cannot evaluate '{} = {}'; skipped", name, rhs.trim()),
            ));
            return;
        };
        if self.index.contains_key(name) {
            self.diagnostics.push(LineDiagnostic::new(
                line,
                format!("'{}' redefined; first definition kept", name),
            ));
            return;
        }
        self.index.insert(name.to_string(), self.constants.len());
        self.constants.push(HeaderConstant {
            name: name.to_string(),
            expr,
            line,
            suffix,
        });
    }

    pub fn get(&self, name: &str) -> Option<&HeaderConstant> {
        self.index.get(name).map(|&i| &self.constants[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn resolve_detailed(&self, name: &str) -> Resolution {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = name.to_string();

        loop {
            if !visited.insert(current.clone()) {
                return Resolution::Cycle { chain };
            }
            chain.push(current.clone());
            match self.get(&current).map(|c| &c.expr) {
                None if chain.len() == 1 => return Resolution::Undefined,
                None => return Resolution::Dangling { chain },
                Some(ConstExpr::Number(value)) => {
                    return Resolution::Resolved {
                        value: *value,
                        chain,
                    }
                }
                Some(ConstExpr::Alias(next)) => current = next.clone(),
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<f64> {
        match self.resolve_detailed(name) {
            Resolution::Resolved { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn resolve_integer(&self, name: &str) -> Option<i64> {
        self.resolve(name)
            .filter(|v| v.fract() == 0.0)
            .map(|v| v as i64)
    }

    /// Every constant that resolves, by name.
    pub fn resolve_all(&self) -> BTreeMap<String, f64> {
        self.constants
            .iter()
            .filter_map(|c| self.resolve(&c.name).map(|v| (c.name.clone(), v)))
            .collect()
    }
}

fn strip_comments(line: &str) -> String {
    let mut out = line.to_string();
    while let (Some(start), Some(end)) = (out.find("/*"), out.find("*/")) {
        if end < start {
            break;
        }
        out.replace_range(start..end + 2, " ");
    }
    if let Some(pos) = out.find("//") {
        out.truncate(pos);
    }
    out
}

fn classify(rhs: &str) -> Option<(ConstExpr, Option<String>)> {
    let mut text = rhs.trim();
    while text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
        text = text[1..text.len() - 1].trim();
    }

    if let Some(caps) = NUMBER_RE.captures(text) {
        let literal = &caps[1];
        let value = parse_literal(literal)?;
        let suffix = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        return Some((ConstExpr::Number(value), suffix));
    }

    if IDENT_RE.is_match(text) {
        let name = text.rsplit("::").next().unwrap_or(text);
        return Some((ConstExpr::Alias(name.to_string()), None));
    }

    None
}

fn parse_literal(literal: &str) -> Option<f64> {
    let (negative, body) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };
    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()? as f64
    } else {
        body.parse::<f64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PINS: &str = r#"
#pragma once
#include <stdint.h>

namespace sedu::pins {
constexpr uint8_t kUsbDm = 19;
constexpr uint8_t kAdcBattery = 1;   // ADC1_CH0
  constexpr uint8_t kAdcNtc     = 10;  // indented
constexpr uint8_t kActuatorPhase = 30;
constexpr uint8_t kActuatorPh = kActuatorPhase;
constexpr float kAdcReferenceVolts = 3.3f;
#define LED_STATUS 0x1A // status LED
}
"#;

    #[test]
    fn test_parse_constants_and_defines() {
        let header = HeaderFile::parse(PINS);
        assert_eq!(header.resolve_integer("kUsbDm"), Some(19));
        assert_eq!(header.resolve_integer("kAdcNtc"), Some(10));
        assert_eq!(header.resolve_integer("LED_STATUS"), Some(26));
        assert_eq!(header.resolve("kAdcReferenceVolts"), Some(3.3));
        assert_eq!(header.get("kAdcReferenceVolts").unwrap().suffix.as_deref(), Some("f"));
        assert!(header.diagnostics.is_empty(), "{:?}", header.diagnostics);
    }

    #[test]
    fn test_alias_resolution() {
        let header = HeaderFile::parse(PINS);
        match header.resolve_detailed("kActuatorPh") {
            Resolution::Resolved { value, chain } => {
                assert_eq!(value, 30.0);
                assert_eq!(chain, vec!["kActuatorPh", "kActuatorPhase"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cycle_is_unresolved() {
        let header = HeaderFile::parse("const int a = b;\nconst int b = c;\nconst int c = a;\n");
        assert!(matches!(header.resolve_detailed("a"), Resolution::Cycle { .. }));
        assert_eq!(header.resolve("a"), None);
        assert!(header.resolve_all().is_empty());
    }

    #[test]
    fn test_dangling_and_undefined() {
        let header = HeaderFile::parse("int a = nowhere;\n");
        assert!(matches!(header.resolve_detailed("a"), Resolution::Dangling { .. }));
        assert_eq!(header.resolve_detailed("zzz"), Resolution::Undefined);
    }

    #[test]
    fn test_multiple_assignments_on_one_line() {
        let header = HeaderFile::parse("int a = 1; int b = 2; // c = 3;\n");
        assert_eq!(header.resolve("a"), Some(1.0));
        assert_eq!(header.resolve("b"), Some(2.0));
        assert!(!header.contains("c"));
    }

    #[test]
    fn test_malformed_line_skipped_with_diagnostic() {
        let header = HeaderFile::parse("const float kA = 1.0f;\nconst float kB = kA * 2;\nconst float kC = 2.5f;\n");
        assert_eq!(header.resolve("kA"), Some(1.0));
        assert_eq!(header.resolve("kC"), Some(2.5));
        assert!(!header.contains("kB"));
        assert_eq!(header.diagnostics.len(), 1);
        assert_eq!(header.diagnostics[0].line, 2);
    }

    #[test]
    fn test_comparisons_are_not_assignments() {
        let header = HeaderFile::parse("if (v == 5;\nif (v <= kMax) return;\n");
        assert!(header.is_empty());
    }
}
