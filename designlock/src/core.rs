//! Project access and the in-process verification suite.
//! Shared by the CLI and the library examples.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::{ConfigError, RuleConfig};
use crate::database::DesignDatabase;
use crate::report::{CheckOutcome, SuiteReport};
use crate::rules::{CheckError, Checker, CheckerRegistry};

#[derive(Debug, thiserror::Error)]
pub enum DesignLockError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error("unknown checker '{0}'")]
    UnknownChecker(String),
    #[error("project root not found: {}", .0.display())]
    RootNotFound(PathBuf),
}

/// A design project on disk plus the rule tables to check it with.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: RuleConfig,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, RuleConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: RuleConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Open an existing directory, optionally with a rule override file.
    pub fn open(root: &Path, rules: Option<&Path>) -> Result<Self, DesignLockError> {
        if !root.is_dir() {
            return Err(DesignLockError::RootNotFound(root.to_path_buf()));
        }
        let config = match rules {
            Some(path) => RuleConfig::load(path)?,
            None => RuleConfig::default(),
        };
        Ok(Self::with_config(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Project-relative path with forward slashes, as shown in reports.
    pub fn display_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.to_string_lossy().replace('\\', "/")
    }

    /// Fresh database load; checkers never share one.
    pub fn load_database(&self) -> Result<DesignDatabase, CheckError> {
        Ok(DesignDatabase::load(&self.resolve(&self.config.paths.database))?)
    }

    /// Read an artifact the checker cannot run without.
    pub fn read_required(&self, what: &str, relative: &Path) -> Result<String, CheckError> {
        let path = self.resolve(relative);
        if !path.is_file() {
            return Err(CheckError::missing(what, &path));
        }
        read_lossy(&path)
    }

    /// Read an artifact that may legitimately be absent.
    pub fn read_optional(&self, relative: &Path) -> Result<Option<String>, CheckError> {
        let path = self.resolve(relative);
        if !path.is_file() {
            return Ok(None);
        }
        read_lossy(&path).map(Some)
    }
}

pub(crate) fn read_lossy(path: &Path) -> Result<String, CheckError> {
    let bytes = std::fs::read(path).map_err(|source| CheckError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Runs checkers one after another. A checker that errors or panics is
/// recorded as MISSING and the rest still run.
pub struct VerificationSuite {
    registry: CheckerRegistry,
}

impl VerificationSuite {
    pub fn new() -> Self {
        Self::with_registry(CheckerRegistry::with_default_checkers())
    }

    pub fn with_registry(registry: CheckerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CheckerRegistry {
        &self.registry
    }

    pub fn run_all(&self, project: &Project) -> SuiteReport {
        tracing::info!(
            "Running {} checkers against {}",
            self.registry.len(),
            project.root().display()
        );
        let outcomes = self
            .registry
            .iter()
            .map(|checker| run_checker(checker.as_ref(), project))
            .collect();
        SuiteReport {
            timestamp: Utc::now(),
            root: project.root().display().to_string(),
            outcomes,
        }
    }

    pub fn run_one(&self, project: &Project, id: &str) -> Result<CheckOutcome, DesignLockError> {
        let checker = self
            .registry
            .get(id)
            .ok_or_else(|| DesignLockError::UnknownChecker(id.to_string()))?;
        Ok(run_checker(checker.as_ref(), project))
    }
}

impl Default for VerificationSuite {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_checker(checker: &dyn Checker, project: &Project) -> CheckOutcome {
    tracing::info!("Running checker '{}'", checker.id());
    let result = panic::catch_unwind(AssertUnwindSafe(|| checker.run(project)));
    let outcome = match result {
        Ok(Ok(report)) => CheckOutcome::from_report(checker, report),
        Ok(Err(err)) => {
            tracing::warn!("Checker '{}' could not run: {}", checker.id(), err);
            CheckOutcome::missing(checker, err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!("Checker '{}' panicked: {}", checker.id(), message);
            CheckOutcome::missing(checker, format!("checker crashed: {}", message))
        }
    };
    tracing::info!("Checker '{}' finished: {}", checker.id(), outcome.status);
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
