//! Banned content.
//!
//! Two independent lists. The database names banned component refs and net
//! names, checked against the BOM and net-label artifacts. The rule table
//! names obsolete strings, scanned line by line over every text file in the
//! project. Each pattern carries its own exemption policy so the whole table
//! is evaluated by one routine.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use regex::{Regex, RegexBuilder};
use walkdir::{DirEntry, WalkDir};

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::{BannedPattern, BannedRules, RegulatorRule};
use crate::core::{read_lossy, Project};
use crate::database::{BannedComponent, BannedNet, Ic};
use crate::parser::{parse_bom, parse_net_labels, BomRow, NetLabel};
use crate::units::{sanitize_ascii, within_tolerance};

pub struct BannedContentChecker;

impl Checker for BannedContentChecker {
    fn id(&self) -> &'static str {
        "banned-content"
    }

    fn name(&self) -> &'static str {
        "Banned content"
    }

    fn description(&self) -> &'static str {
        "Banned components and nets in artifacts, obsolete values in documentation"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let config = project.config();
        let rules = &config.banned;
        let table = BannedTable::compile(rules)?;
        let db = project.load_database()?;

        let mut report = CheckReport::new("banned-content", "Banned content");

        let bom_path = project.display_path(&project.resolve(&config.paths.bom));
        let bom = project.read_optional(&config.paths.bom)?.map(|text| {
            let parsed = parse_bom(&text);
            report.absorb_diagnostics(&bom_path, parsed.diagnostics);
            parsed.value
        });
        let nets_path = project.display_path(&project.resolve(&config.paths.net_labels));
        let nets = project.read_optional(&config.paths.net_labels)?.map(|text| {
            let parsed = parse_net_labels(&text);
            report.absorb_diagnostics(&nets_path, parsed.diagnostics);
            parsed.value
        });

        check_banned_lists(
            db.banned_components()?.as_deref(),
            db.banned_nets()?.as_deref(),
            Artifact::new(&bom_path, bom.as_deref()),
            Artifact::new(&nets_path, nets.as_deref()),
            &rules.descriptive_ref_marker,
            &mut report,
        );

        if let Some(regulator) = &rules.regulator {
            check_regulator(&db.ics()?, regulator, &mut report);
        }

        let scanned = scan_tree(project.root(), &table, rules, &mut report);
        report.pass(format!("{} files scanned for obsolete values", scanned));
        Ok(report)
    }
}

/// Why a match does not count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exemption {
    /// The file path is on an allow-list.
    AllowedPath,
    /// The line carries a safe-context phrase.
    SafeContext(String),
    /// The line also names the replacement.
    Transition,
    /// A word such as `from` directly precedes the match.
    Preceded(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub pattern_id: String,
    pub matched: String,
    /// 1-based byte column in the sanitized line.
    pub column: usize,
    pub exemption: Option<Exemption>,
}

struct CompiledPattern {
    rule: BannedPattern,
    regex: Regex,
    allow_paths: Vec<Regex>,
    scope_paths: Vec<Regex>,
}

/// The banned-string table with its regexes built.
pub struct BannedTable {
    patterns: Vec<CompiledPattern>,
    allow_paths: Vec<Regex>,
    safe_phrases: Vec<(String, Regex)>,
}

fn compile_all(sources: &[String], what: &str) -> Result<Vec<Regex>, CheckError> {
    sources
        .iter()
        .map(|s| {
            Regex::new(s).map_err(|e| CheckError::Config(format!("{} '{}': {}", what, s, e)))
        })
        .collect()
}

impl BannedTable {
    pub fn compile(rules: &BannedRules) -> Result<Self, CheckError> {
        let mut patterns = Vec::with_capacity(rules.patterns.len());
        let mut ids = HashSet::new();
        for rule in &rules.patterns {
            if !ids.insert(rule.id.as_str()) {
                return Err(CheckError::Config(format!(
                    "banned pattern id '{}' is defined more than once",
                    rule.id
                )));
            }
            if !rule.severity.is_failure() {
                return Err(CheckError::Config(format!(
                    "banned pattern '{}' has non-failing severity {}",
                    rule.id, rule.severity
                )));
            }
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(rule.case_insensitive)
                .build()
                .map_err(|e| CheckError::Config(format!("banned pattern '{}': {}", rule.id, e)))?;
            patterns.push(CompiledPattern {
                regex,
                allow_paths: compile_all(&rule.allow_paths, "allow path")?,
                scope_paths: compile_all(&rule.scope_paths, "scope path")?,
                rule: rule.clone(),
            });
        }

        let safe_phrases = rules
            .safe_phrases
            .iter()
            .map(|phrase| {
                let source = format!(r"(?i)\b{}\b", regex::escape(phrase));
                Regex::new(&source)
                    .map(|re| (phrase.clone(), re))
                    .map_err(|e| CheckError::Config(format!("safe phrase '{}': {}", phrase, e)))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            patterns,
            allow_paths: compile_all(&rules.allow_paths, "allow path")?,
            safe_phrases,
        })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a pattern looks at this path at all. Out-of-scope paths are
    /// skipped; allow-listed paths are still matched but exempted.
    fn in_scope(pattern: &CompiledPattern, rel_path: &str) -> bool {
        pattern.scope_paths.is_empty() || pattern.scope_paths.iter().any(|re| re.is_match(rel_path))
    }

    fn path_allowed(&self, pattern: &CompiledPattern, rel_path: &str) -> bool {
        (pattern.rule.use_allowlist && self.allow_paths.iter().any(|re| re.is_match(rel_path)))
            || pattern.allow_paths.iter().any(|re| re.is_match(rel_path))
    }

    fn safe_phrase(&self, line: &str) -> Option<&str> {
        self.safe_phrases
            .iter()
            .find(|(_, re)| re.is_match(line))
            .map(|(phrase, _)| phrase.as_str())
    }

    /// Every match of every in-scope pattern on one line, exempted or not.
    pub fn evaluate_line(&self, rel_path: &str, line: &str) -> Vec<LineMatch> {
        let line = sanitize_ascii(line);
        let mut matches = Vec::new();

        for pattern in &self.patterns {
            if !Self::in_scope(pattern, rel_path) {
                continue;
            }
            for m in pattern.regex.find_iter(&line) {
                let exemption = if self.path_allowed(pattern, rel_path) {
                    Some(Exemption::AllowedPath)
                } else if let Some(word) = preceding_word(&line[..m.start()])
                    .filter(|w| {
                        pattern
                            .rule
                            .preceded_by_exclusions
                            .iter()
                            .any(|e| e.eq_ignore_ascii_case(w))
                    })
                {
                    Some(Exemption::Preceded(word.to_ascii_lowercase()))
                } else if pattern
                    .rule
                    .replacement_marker
                    .as_deref()
                    .is_some_and(|marker| line.contains(marker))
                {
                    Some(Exemption::Transition)
                } else if pattern.rule.honor_safe_context {
                    self.safe_phrase(&line)
                        .map(|p| Exemption::SafeContext(p.to_string()))
                } else {
                    None
                };

                matches.push(LineMatch {
                    pattern_id: pattern.rule.id.clone(),
                    matched: m.as_str().to_string(),
                    column: m.start() + 1,
                    exemption,
                });
            }
        }
        matches
    }

    /// Unexempted matches in a whole file.
    pub fn scan_text(&self, rel_path: &str, text: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            for hit in self.evaluate_line(rel_path, line) {
                if hit.exemption.is_some() {
                    continue;
                }
                let Some(pattern) = self.patterns.iter().find(|p| p.rule.id == hit.pattern_id) else {
                    continue;
                };
                let mut violation = Violation::new(
                    format!("banned-content.{}", pattern.rule.id),
                    pattern.rule.severity,
                    Location::line(rel_path, idx + 1),
                    pattern.rule.reason.clone(),
                )
                .observed(&hit.matched);
                if let Some(replacement) = &pattern.rule.replacement {
                    violation = violation.expected(replacement);
                }
                violations.push(violation);
            }
        }
        violations
    }

    /// No pattern would look at this path.
    fn ignores_path(&self, rel_path: &str) -> bool {
        self.patterns
            .iter()
            .all(|p| !Self::in_scope(p, rel_path) || self.path_allowed(p, rel_path))
    }
}

fn preceding_word(before: &str) -> Option<&str> {
    let trimmed = before.trim_end();
    let start = trimmed
        .rfind(|c: char| !c.is_ascii_alphabetic())
        .map(|i| i + 1)
        .unwrap_or(0);
    let word = &trimmed[start..];
    (!word.is_empty()).then_some(word)
}

/// An optional artifact and its display path.
pub struct Artifact<'a, T> {
    pub path: &'a str,
    pub rows: Option<&'a [T]>,
}

impl<'a, T> Artifact<'a, T> {
    pub fn new(path: &'a str, rows: Option<&'a [T]>) -> Self {
        Self { path, rows }
    }
}

pub fn check_banned_lists(
    components: Option<&[BannedComponent]>,
    nets: Option<&[BannedNet]>,
    bom: Artifact<'_, BomRow>,
    labels: Artifact<'_, NetLabel>,
    descriptive_marker: &str,
    report: &mut CheckReport,
) {
    let components = components.unwrap_or_default();
    let nets = nets.unwrap_or_default();

    if components.is_empty() {
        report.push(Violation::new(
            "banned-content.no-banned-components",
            Severity::High,
            Location::section("banned_components"),
            "database has no banned_components list",
        ));
    }
    if nets.is_empty() {
        report.push(Violation::new(
            "banned-content.no-banned-nets",
            Severity::High,
            Location::section("banned_nets"),
            "database has no banned_nets list",
        ));
    }

    match bom.rows {
        None => report.push(Violation::new(
            "banned-content.artifact-missing",
            Severity::Warn,
            Location::file(bom.path),
            "BOM not found; banned components not checked",
        )),
        Some(rows) => {
            let mut hits = 0;
            for banned in components {
                if !descriptive_marker.is_empty() && banned.reference.contains(descriptive_marker) {
                    continue;
                }
                for row in rows.iter().filter(|r| r.reference == banned.reference) {
                    hits += 1;
                    report.push(Violation::new(
                        "banned-content.component",
                        Severity::Critical,
                        Location::line(bom.path, row.line),
                        format!(
                            "BOM contains banned component {} ({})",
                            banned.reference,
                            banned.reason.as_deref().unwrap_or("eliminated")
                        ),
                    ));
                }
            }
            if hits == 0 {
                report.pass(format!("no banned components in {}", bom.path));
            }
        }
    }

    match labels.rows {
        None => report.push(Violation::new(
            "banned-content.artifact-missing",
            Severity::Warn,
            Location::file(labels.path),
            "net-label list not found; banned nets not checked",
        )),
        Some(rows) => {
            let mut hits = 0;
            for banned in nets {
                for row in rows.iter().filter(|r| r.name == banned.name) {
                    hits += 1;
                    report.push(Violation::new(
                        "banned-content.net",
                        Severity::Critical,
                        Location::line(labels.path, row.line),
                        format!(
                            "net label {} still exists ({})",
                            banned.name,
                            banned.reason.as_deref().unwrap_or("eliminated")
                        ),
                    ));
                }
            }
            if hits == 0 {
                report.pass(format!("no banned nets in {}", labels.path));
            }
        }
    }
}

pub fn check_regulator(ics: &BTreeMap<String, Ic>, rule: &RegulatorRule, report: &mut CheckReport) {
    let location = Location::section(format!("ics.{}", rule.reference));
    let Some(ic) = ics.get(&rule.reference) else {
        report.push(Violation::new(
            "banned-content.regulator",
            Severity::High,
            location,
            format!("{} is not defined in the ics section", rule.reference),
        ));
        return;
    };

    let part = ic.part.as_deref().unwrap_or("");
    if !part.contains(&rule.part_contains) {
        report.push(
            Violation::new(
                "banned-content.regulator",
                Severity::High,
                location.clone(),
                format!("{} is not the single-stage regulator", rule.reference),
            )
            .observed(part)
            .expected(&rule.part_contains),
        );
    }

    match ic.output_voltage_volts() {
        Some(v) if within_tolerance(v, rule.output_voltage, 1e-6) => report.pass(format!(
            "{} ({}) outputs {} V",
            rule.reference, part, rule.output_voltage
        )),
        other => report.push(
            Violation::new(
                "banned-content.regulator",
                Severity::High,
                location,
                format!("{} output voltage is wrong", rule.reference),
            )
            .observed(other.map_or_else(|| "<none>".to_string(), |v| format!("{} V", v)))
            .expected(format!("{} V", rule.output_voltage)),
        ),
    }
}

fn skip_entry(entry: &DirEntry, rules: &BannedRules) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return entry.depth() > 0 && rules.skip_dirs.iter().any(|d| *d == name);
    }
    let extension = entry
        .path()
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    extension.is_some_and(|ext| rules.skip_extensions.iter().any(|s| s.eq_ignore_ascii_case(&ext)))
}

/// Scan every text file under `root`. Returns how many files were read.
pub fn scan_tree(root: &Path, table: &BannedTable, rules: &BannedRules, report: &mut CheckReport) -> usize {
    let mut scanned = 0;
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !skip_entry(e, rules));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_path = relative.to_string_lossy().replace('\\', "/");
        if table.ignores_path(&rel_path) {
            tracing::debug!("Not scanning {}", rel_path);
            continue;
        }

        let text = match read_lossy(entry.path()) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("{}", err);
                continue;
            }
        };
        if text.contains('\0') {
            continue;
        }
        scanned += 1;
        for violation in table.scan_text(&rel_path, &text) {
            report.push(violation);
        }
    }
    tracing::debug!("Banned-content scan read {} files", scanned);
    scanned
}
