//! Example: run the full verification suite over a project directory.
//! Run with: cargo run --example run_suite [path/to/project]

use designlock::report::render_suite_human;
use designlock::{Project, VerificationSuite};
use std::path::PathBuf;

fn main() -> Result<(), designlock::DesignLockError> {
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/project"));

    let project = Project::open(&root, None)?;
    let suite = VerificationSuite::new().run_all(&project);
    print!("{}", render_suite_human(&suite));
    std::process::exit(suite.exit_code());
}
