//! DesignLock CLI - design-database consistency checks from the command line.

use clap::{Parser, Subcommand, ValueEnum};
use designlock::report::{
    render_github, render_human, render_json, render_suite_github, render_suite_human,
};
use designlock::{
    normalize_value, CheckOutcome, CheckStatus, CheckerRegistry, Project, SuiteReport,
    VerificationSuite,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "designlock")]
#[command(about = "Design-database consistency checks for PCB projects", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root containing design_database.yaml
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    root: PathBuf,

    /// Rule override file (.yaml, .yml or .json)
    #[arg(long, global = true, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single checker
    Check {
        /// Checker id (see `designlock checkers`)
        #[arg(value_name = "CHECKER")]
        checker: String,
    },

    /// Run the full verification suite
    All,

    /// List available checkers (`-v` adds descriptions)
    Checkers,

    /// Print the canonical quantity for component values
    Normalize {
        #[arg(value_name = "VALUE", required = true)]
        values: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for CI/CD
    Json,
    /// GitHub Actions format
    Github,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Check { ref checker } => handle_check(&cli, checker),
        Commands::All => handle_all(&cli),
        Commands::Checkers => {
            handle_checkers(cli.verbose);
            0
        }
        Commands::Normalize { ref values } => handle_normalize(values, cli.format),
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_project(root: &Path, rules: Option<&Path>) -> anyhow::Result<Project> {
    tracing::debug!("Opening project at {}", root.display());
    Ok(Project::open(root, rules)?)
}

fn handle_check(cli: &Cli, checker: &str) -> i32 {
    let project = match open_project(&cli.root, cli.rules.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let suite = VerificationSuite::with_registry(CheckerRegistry::with_all_checkers());
    match suite.run_one(&project, checker) {
        Ok(outcome) => {
            output_outcome(&outcome, cli.format);
            outcome.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Available checkers: {}", suite.registry().ids().join(", "));
            2
        }
    }
}

fn handle_all(cli: &Cli) -> i32 {
    let project = match open_project(&cli.root, cli.rules.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let suite = VerificationSuite::new().run_all(&project);
    output_suite(&suite, cli.format);
    suite.exit_code()
}

fn output_outcome(outcome: &CheckOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(render_json(outcome)),
        OutputFormat::Human => match &outcome.report {
            Some(report) => print!("{}", render_human(report)),
            None => println!(
                "[MISSING] {}: {}",
                outcome.checker,
                outcome.error.as_deref().unwrap_or("could not run")
            ),
        },
        OutputFormat::Github => match &outcome.report {
            Some(report) => print!("{}", render_github(report)),
            None => println!(
                "::error title={}::could not run: {}",
                outcome.checker,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        },
    }
    if outcome.status == CheckStatus::Missing && !matches!(format, OutputFormat::Json) {
        if let Some(error) = &outcome.error {
            eprintln!("Error: {}", error);
        }
    }
}

fn output_suite(suite: &SuiteReport, format: OutputFormat) {
    match format {
        OutputFormat::Human => print!("{}", render_suite_human(suite)),
        OutputFormat::Json => print_json(render_json(suite)),
        OutputFormat::Github => print!("{}", render_suite_github(suite)),
    }
}

fn print_json(rendered: Result<String, serde_json::Error>) {
    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: could not serialize report: {}", e),
    }
}

fn handle_checkers(verbose: bool) {
    println!("Available checkers:\n");
    let defaults = CheckerRegistry::with_default_checkers().ids();
    for checker in CheckerRegistry::with_all_checkers().iter() {
        let marker = if defaults.contains(&checker.id()) {
            ""
        } else {
            " (on request)"
        };
        println!("  {}{}", checker.id(), marker);
        println!("    {}", checker.name());
        if verbose {
            println!("    {}", checker.description());
        }
        println!();
    }
}

fn handle_normalize(values: &[String], format: OutputFormat) -> i32 {
    let mut exit_code = 0;
    let mut rows = Vec::new();
    for raw in values {
        match normalize_value(raw) {
            Ok(q) => {
                rows.push(serde_json::json!({
                    "input": raw,
                    "value": q.value,
                    "unit": q.unit.symbol(),
                }));
                if !matches!(format, OutputFormat::Json) {
                    println!("{} = {}", raw, q);
                }
            }
            Err(e) => {
                rows.push(serde_json::json!({ "input": raw, "error": e.to_string() }));
                if !matches!(format, OutputFormat::Json) {
                    eprintln!("Error: {}", e);
                }
                exit_code = 2;
            }
        }
    }
    if matches!(format, OutputFormat::Json) {
        print_json(render_json(&rows));
    }
    exit_code
}
