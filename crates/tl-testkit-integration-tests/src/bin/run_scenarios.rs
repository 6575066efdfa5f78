//! tl Scenario Runner
//!
//! Runs declarative CLI scenarios against a tl compiler and writes a report.

use clap::Parser;
use std::path::PathBuf;
use tl_testkit::{HarnessConfig, ProcessHarness};
use tl_testkit_integration_tests::scenario::discover_scenarios;
use tl_testkit_integration_tests::{Scenario, ScenarioRunner};

#[derive(Parser)]
#[command(name = "run-scenarios")]
#[command(about = "Run declarative CLI scenarios against the tl compiler")]
struct Cli {
    /// Directory containing scenario JSON files
    #[arg(long)]
    scenarios: PathBuf,

    /// Path to a tl-testkit.toml configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interpreter that runs the compiler
    #[arg(long)]
    interpreter: Option<String>,

    /// Path to the compiler executable
    #[arg(long)]
    executable: Option<PathBuf>,

    /// Output directory for reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only run scenarios whose name contains this pattern
    #[arg(long)]
    filter: Option<String>,

    /// Print every failed check
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tl_testkit::init_tracing();

    let cwd = std::env::current_dir()?;
    let mut config = HarnessConfig::load(cli.config.as_deref(), &cwd)?;
    if let Some(interpreter) = cli.interpreter {
        config.interpreter = interpreter;
    }
    if let Some(executable) = cli.executable {
        config.executable = executable;
    }

    if !cli.scenarios.is_dir() {
        eprintln!("Scenario directory not found: {}", cli.scenarios.display());
        std::process::exit(2);
    }

    let mut scenarios = Vec::new();
    for path in discover_scenarios(&cli.scenarios)? {
        let scenario = Scenario::load(&path)?;
        if cli
            .filter
            .as_deref()
            .is_none_or(|pattern| scenario.name.contains(pattern))
        {
            scenarios.push(scenario);
        }
    }

    println!("tl scenario runner");
    println!("  Compiler:  {} {}", config.interpreter, config.executable.display());
    println!("  Scenarios: {}", scenarios.len());
    println!();

    let runner = ScenarioRunner::new(ProcessHarness::new(config));
    let report = runner.run_all(&scenarios);

    for result in &report.results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!("  {status} {}", result.name);
        if cli.verbose {
            for failure in &result.failures {
                for line in failure.lines() {
                    println!("       {line}");
                }
            }
        }
    }

    println!();
    println!("  Total:  {}", report.total);
    println!("  Passed: {}", report.passed);
    println!("  Failed: {}", report.failed);

    if let Some(output) = &cli.output {
        report.save(output)?;
        println!();
        println!("Reports saved to: {}", output.display());
    }

    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
