//! DesignLock - design-database consistency checks for PCB projects
//!
//! One YAML design database is the source of truth for a board. This library
//! checks that the artifacts around it (BOM, net labels, firmware pin header,
//! button-ladder firmware, KiCad board file and docs) still agree with it.
//!
//! # Quick Start
//!
//! ```no_run
//! use designlock::{Project, VerificationSuite};
//! use std::path::Path;
//!
//! let project = Project::open(Path::new("."), None).unwrap();
//! let suite = VerificationSuite::new().run_all(&project);
//!
//! for outcome in &suite.outcomes {
//!     println!("{}: {}", outcome.checker, outcome.status);
//! }
//! std::process::exit(suite.exit_code());
//! ```
//!
//! # Checkers
//!
//! - **schema**: required sections and field shapes in the database
//! - **value-locks**: frozen component values and the board size
//! - **pin-map**: GPIO assignments against `pins.h`
//! - **net-labels**: rails and GPIO functions in the net-label list
//! - **geometry**: board outline and mounting holes in the PCB file
//! - **banned-content**: retired parts, nets and phrases across the repo
//! - **voltage-bands**: button-ladder thresholds in firmware and docs
//! - **bom-completeness**: every IC's support parts in the BOM
//! - **docs-index**: the docs index against the tree (on request only)

pub mod config;
pub mod core;
pub mod database;
pub mod parser;
pub mod report;
pub mod rules;
pub mod units;

// Re-export main types
pub use config::{ConfigError, RuleConfig};
pub use crate::core::{run_checker, DesignLockError, Project, VerificationSuite};
pub use database::{DatabaseError, DesignDatabase};
pub use report::{CheckOutcome, CheckStatus, SuiteReport};
pub use rules::{
    CheckError, CheckReport, Checker, CheckerRegistry, Location, Severity, Violation,
};
pub use units::{normalize_value, Quantity, Unit, ValueError};

/// Run one checker by id against a project directory (convenience wrapper).
pub fn check(root: &std::path::Path, checker: &str) -> Result<CheckOutcome, DesignLockError> {
    let project = Project::open(root, None)?;
    VerificationSuite::with_registry(CheckerRegistry::with_all_checkers()).run_one(&project, checker)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CheckError, CheckOutcome, CheckReport, CheckStatus, Checker, CheckerRegistry,
        DesignDatabase, DesignLockError, Location, Project, RuleConfig, Severity, SuiteReport,
        VerificationSuite, Violation,
    };
}
