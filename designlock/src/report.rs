//! Diagnostics reporter.
//!
//! Renders checker reports and the suite summary as plain ASCII text, JSON,
//! or GitHub Actions annotations, and computes exit codes. All text passes
//! through [`sanitize_ascii`] before it is emitted.

use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::rules::{CheckReport, Checker, Location, Severity, Violation};
use crate::units::sanitize_ascii;

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// The checker could not run.
    Missing,
}

impl CheckStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckStatus::Pass => 0,
            CheckStatus::Fail => 1,
            CheckStatus::Missing => 2,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Missing => "MISSING",
        })
    }
}

/// Result of one checker run inside the suite.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub checker: String,
    pub name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn from_report(checker: &dyn Checker, report: CheckReport) -> Self {
        let status = if report.passed() {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        };
        Self {
            checker: checker.id().to_string(),
            name: checker.name().to_string(),
            status,
            report: Some(report),
            error: None,
        }
    }

    pub fn missing(checker: &dyn Checker, error: String) -> Self {
        Self {
            checker: checker.id().to_string(),
            name: checker.name().to_string(),
            status: CheckStatus::Missing,
            report: None,
            error: Some(error),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub timestamp: DateTime<Utc>,
    pub root: String,
    pub outcomes: Vec<CheckOutcome>,
}

impl SuiteReport {
    pub fn count(&self, status: CheckStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == CheckStatus::Pass)
    }

    /// 0 when every checker passed, 1 when any failed, otherwise 2.
    pub fn exit_code(&self) -> i32 {
        if self.count(CheckStatus::Fail) > 0 {
            1
        } else if self.count(CheckStatus::Missing) > 0 {
            2
        } else {
            0
        }
    }
}

fn heavy_rule(out: &mut String) {
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
}

fn light_rule(out: &mut String) {
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
}

fn describe(v: &Violation) -> String {
    let mut line = format!("[{}] {}: {}", v.severity, v.location, v.reason);
    match (&v.observed, &v.expected) {
        (Some(observed), Some(expected)) => {
            let _ = write!(line, " (found {}, expected {})", observed, expected);
        }
        (Some(observed), None) => {
            let _ = write!(line, " (found {})", observed);
        }
        (None, Some(expected)) => {
            let _ = write!(line, " (expected {})", expected);
        }
        (None, None) => {}
    }
    line
}

/// One checker's section: header, confirmations, findings by severity,
/// skipped lines, and a PASS/FAIL banner.
pub fn render_human(report: &CheckReport) -> String {
    let mut out = String::new();
    heavy_rule(&mut out);
    let _ = writeln!(out, "{}", report.title.to_uppercase());
    heavy_rule(&mut out);

    for pass in &report.passes {
        let _ = writeln!(out, "[OK]   {}", pass);
    }

    let mut ordered: Vec<&Violation> = report.violations.iter().collect();
    // Stable: within a severity, source iteration order is kept.
    ordered.sort_by_key(|v| v.severity);
    for v in ordered {
        let _ = writeln!(out, "{}", describe(v));
    }

    for d in &report.diagnostics {
        let _ = writeln!(out, "[SKIP] {}:{}: {}", d.file, d.line, d.message);
    }

    light_rule(&mut out);
    let banner = if report.passed() { "PASS" } else { "FAIL" };
    let _ = writeln!(
        out,
        "[{}] {}: {} failure(s), {} warning(s)",
        banner,
        report.title,
        report.failure_count(),
        report.warning_count()
    );
    sanitize_ascii(&out)
}

/// Every section in run order, then the summary table and final banner.
pub fn render_suite_human(suite: &SuiteReport) -> String {
    let mut out = String::new();
    for outcome in &suite.outcomes {
        match (&outcome.report, &outcome.error) {
            (Some(report), _) => out.push_str(&render_human(report)),
            (None, error) => {
                heavy_rule(&mut out);
                let _ = writeln!(out, "{}", outcome.name.to_uppercase());
                heavy_rule(&mut out);
                let _ = writeln!(
                    out,
                    "[MISSING] {}: {}",
                    outcome.checker,
                    error.as_deref().unwrap_or("could not run")
                );
            }
        }
        out.push('\n');
    }

    heavy_rule(&mut out);
    let _ = writeln!(out, "VERIFICATION SUMMARY ({})", suite.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    heavy_rule(&mut out);
    for outcome in &suite.outcomes {
        let _ = writeln!(out, "  {:<28} {}", outcome.name, outcome.status);
    }
    light_rule(&mut out);
    let total = suite.outcomes.len();
    if suite.all_passed() {
        let _ = writeln!(out, "[PASS] All {} checks passed", total);
    } else {
        let _ = writeln!(
            out,
            "[FAIL] {} passed, {} failed, {} could not run (of {})",
            suite.count(CheckStatus::Pass),
            suite.count(CheckStatus::Fail),
            suite.count(CheckStatus::Missing),
            total
        );
    }
    sanitize_ascii(&out)
}

pub fn render_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

fn github_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High | Severity::Medium => "error",
        Severity::Warn => "warning",
        Severity::Info => "notice",
    }
}

/// GitHub Actions workflow commands, one per finding.
pub fn render_github(report: &CheckReport) -> String {
    let mut out = String::new();
    for v in &report.violations {
        let level = github_level(v.severity);
        let message = describe(v).replace('\n', " ");
        match &v.location {
            Location::File { path, line: Some(line) } => {
                let _ = writeln!(out, "::{} file={},line={}::{}", level, path, line, message);
            }
            Location::File { path, line: None } => {
                let _ = writeln!(out, "::{} file={}::{}", level, path, message);
            }
            Location::Section { .. } => {
                let _ = writeln!(out, "::{} title={}::{}", level, report.checker, message);
            }
        }
    }
    sanitize_ascii(&out)
}

pub fn render_suite_github(suite: &SuiteReport) -> String {
    let mut out = String::new();
    for outcome in &suite.outcomes {
        match &outcome.report {
            Some(report) => out.push_str(&render_github(report)),
            None => {
                let _ = writeln!(
                    out,
                    "::error title={}::could not run: {}",
                    outcome.checker,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    sanitize_ascii(&out)
}
