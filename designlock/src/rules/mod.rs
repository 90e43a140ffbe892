//! Rule checkers.
//!
//! Each concern has a pure `check_*` function over already-loaded inputs and
//! a [`Checker`] wrapper that loads those inputs from a [`Project`]. The pure
//! functions never touch the filesystem, so tests can feed them substituted
//! databases, artifacts and rule tables.
//!
//! A checker that could not load what it needs returns [`CheckError`]
//! (exit 2). Everything it finds once running goes into the [`CheckReport`].

pub mod banned;
pub mod bom;
pub mod docs_index;
pub mod geometry;
pub mod ladder;
pub mod netlabels;
pub mod pinmap;
pub mod schema;
pub mod value_locks;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Project;
use crate::database::DatabaseError;
use crate::parser::LineDiagnostic;

pub use banned::BannedContentChecker;
pub use bom::BomCompletenessChecker;
pub use docs_index::DocsIndexChecker;
pub use geometry::GeometryChecker;
pub use ladder::VoltageBandChecker;
pub use netlabels::NetLabelChecker;
pub use pinmap::PinMapChecker;
pub use schema::SchemaChecker;
pub use value_locks::ValueLockChecker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Warn,
    Info,
}

impl Severity {
    /// Critical, High and Medium findings fail the checker.
    pub fn is_failure(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High | Severity::Medium)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a finding points: a line in a file or a key in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    File { path: String, line: Option<usize> },
    Section { key: String },
}

impl Location {
    pub fn file(path: impl Into<String>) -> Self {
        Location::File {
            path: path.into(),
            line: None,
        }
    }

    pub fn line(path: impl Into<String>, line: usize) -> Self {
        Location::File {
            path: path.into(),
            line: Some(line),
        }
    }

    pub fn section(key: impl Into<String>) -> Self {
        Location::Section { key: key.into() }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File { path, line: Some(line) } => write!(f, "{}:{}", path, line),
            Location::File { path, line: None } => f.write_str(path),
            Location::Section { key } => write!(f, "[{}]", key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Dotted rule id, e.g. `pin-map.duplicate`.
    pub rule: String,
    pub severity: Severity,
    pub location: Location,
    pub observed: Option<String>,
    pub expected: Option<String>,
    pub reason: String,
}

impl Violation {
    pub fn new(
        rule: impl Into<String>,
        severity: Severity,
        location: Location,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            severity,
            location,
            observed: None,
            expected: None,
            reason: reason.into(),
        }
    }

    pub fn observed(mut self, value: impl fmt::Display) -> Self {
        self.observed = Some(value.to_string());
        self
    }

    pub fn expected(mut self, value: impl fmt::Display) -> Self {
        self.expected = Some(value.to_string());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.severity.is_failure()
    }
}

/// A line skipped while reading an input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub message: String,
}

/// Everything one checker found.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub checker: String,
    pub title: String,
    pub violations: Vec<Violation>,
    /// Confirmations printed as `[OK]` lines.
    pub passes: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckReport {
    pub fn new(checker: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            checker: checker.into(),
            title: title.into(),
            violations: Vec::new(),
            passes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn pass(&mut self, message: impl Into<String>) {
        self.passes.push(message.into());
    }

    pub fn absorb_diagnostics(&mut self, file: &str, diagnostics: Vec<LineDiagnostic>) {
        for d in diagnostics {
            tracing::debug!("{}:{}: {}", file, d.line, d.message);
            self.diagnostics.push(Diagnostic {
                file: file.to_string(),
                line: d.line,
                message: d.message,
            });
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_failure())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_failure())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn passed(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// Violations with the given rule id.
    pub fn by_rule<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.rule == rule)
    }
}

/// A checker could not run at all.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("{what} not found: {}", .path.display())]
    MissingFile { what: String, path: PathBuf },
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid rule configuration: {0}")]
    Config(String),
}

impl CheckError {
    pub fn missing(what: impl Into<String>, path: &Path) -> Self {
        CheckError::MissingFile {
            what: what.into(),
            path: path.to_path_buf(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}

pub trait Checker: Send + Sync {
    /// Short kebab-case id used on the command line.
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn run(&self, project: &Project) -> Result<CheckReport, CheckError>;
}

/// Ordered set of checkers.
pub struct CheckerRegistry {
    checkers: Vec<Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    /// The verification suite, in run order.
    pub fn with_default_checkers() -> Self {
        let mut registry = Self::new();
        registry.add_checker(Arc::new(SchemaChecker));
        registry.add_checker(Arc::new(ValueLockChecker));
        registry.add_checker(Arc::new(PinMapChecker));
        registry.add_checker(Arc::new(NetLabelChecker));
        registry.add_checker(Arc::new(GeometryChecker));
        registry.add_checker(Arc::new(BannedContentChecker));
        registry.add_checker(Arc::new(VoltageBandChecker));
        registry.add_checker(Arc::new(BomCompletenessChecker));
        registry
    }

    /// Default suite plus checkers that only run on request.
    pub fn with_all_checkers() -> Self {
        let mut registry = Self::with_default_checkers();
        registry.add_checker(Arc::new(DocsIndexChecker));
        registry
    }

    pub fn add_checker(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Checker>> {
        self.checkers.iter().find(|c| c.id() == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Checker>> {
        self.checkers.iter()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.checkers.iter().map(|c| c.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::with_default_checkers()
    }
}
