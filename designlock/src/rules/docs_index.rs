//! `docs/DOCS_INDEX.md` against the files actually in the repository.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use super::{CheckError, CheckReport, Checker, Location, Severity, Violation};
use crate::config::DocsIndexRules;
use crate::core::Project;
use crate::parser::scan_lines;

static CODE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("code span pattern"));

pub struct DocsIndexChecker;

impl Checker for DocsIndexChecker {
    fn id(&self) -> &'static str {
        "docs-index"
    }

    fn name(&self) -> &'static str {
        "Docs index"
    }

    fn description(&self) -> &'static str {
        "Paths listed in the docs index exist and indexed folders have no unlisted files"
    }

    fn run(&self, project: &Project) -> Result<CheckReport, CheckError> {
        let config = project.config();
        let index_rel = &config.paths.docs_index;
        let text = project.read_required("docs index", index_rel)?;
        let index_path = project.display_path(&project.resolve(index_rel));

        let artifacts = list_artifacts(project.root(), &config.docs_index);
        let root = project.root();
        Ok(check_docs_index(
            &text,
            &index_path,
            &artifacts,
            |rel| root.join(rel).exists(),
            &config.docs_index,
        ))
    }
}

/// Backticked paths under one of the scanned folders, with the line each
/// first appears on. Trailing slashes are dropped.
pub fn indexed_paths(text: &str, rules: &DocsIndexRules) -> BTreeMap<String, usize> {
    let mut paths = BTreeMap::new();
    for candidate in scan_lines(text, &CODE_SPAN) {
        let Some(span) = candidate.group(0) else {
            continue;
        };
        let path = span.trim().trim_start_matches("./").trim_end_matches('/');
        let scanned = rules
            .scan_dirs
            .iter()
            .any(|dir| path.starts_with(&format!("{}/", dir)));
        if scanned && !path.contains(char::is_whitespace) {
            paths.entry(path.to_string()).or_insert(candidate.line);
        }
    }
    paths
}

/// Files under the scanned folders, as `/`-separated paths relative to `root`.
pub fn list_artifacts(root: &Path, rules: &DocsIndexRules) -> BTreeSet<String> {
    let mut artifacts = BTreeSet::new();
    for dir in &rules.scan_dirs {
        let base = root.join(dir);
        if !base.is_dir() {
            continue;
        }
        let walker = WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !ignored_name(&e.file_name().to_string_lossy(), rules));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || ignored_extension(entry.path(), rules) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                artifacts.insert(parts.join("/"));
            }
        }
    }
    artifacts
}

fn ignored_name(name: &str, rules: &DocsIndexRules) -> bool {
    rules.ignore_names.iter().any(|n| n == name)
}

fn ignored_extension(path: &Path, rules: &DocsIndexRules) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| {
            rules
                .ignore_extensions
                .iter()
                .any(|i| i.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
}

/// `exists` answers for a path relative to the project root. A listed
/// directory covers every file beneath it.
pub fn check_docs_index(
    index_text: &str,
    index_path: &str,
    artifacts: &BTreeSet<String>,
    exists: impl Fn(&str) -> bool,
    rules: &DocsIndexRules,
) -> CheckReport {
    let mut report = CheckReport::new("docs-index", "Docs index");
    let listed = indexed_paths(index_text, rules);

    for (path, &line) in &listed {
        if !exists(path) {
            report.push(Violation::new(
                "docs-index.missing",
                Severity::High,
                Location::line(index_path, line),
                format!("indexed path {} does not exist", path),
            ));
        }
    }

    let covered = |artifact: &str| {
        listed.keys().any(|p| {
            artifact == p
                || artifact
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    };
    let unindexed: Vec<&String> = artifacts
        .iter()
        .filter(|a| a.as_str() != index_path && !covered(a))
        .collect();
    for artifact in &unindexed {
        report.push(Violation::new(
            "docs-index.unindexed",
            Severity::Warn,
            Location::file(artifact.as_str()),
            format!("{} is not listed in {}", artifact, index_path),
        ));
    }

    report.pass(format!(
        "{} indexed paths, {} files scanned, {} unindexed",
        listed.len(),
        artifacts.len(),
        unindexed.len()
    ));
    report
}
