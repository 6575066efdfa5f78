//! Declarative CLI scenarios
//!
//! A scenario provisions a project tree, runs one compiler subcommand in it
//! and checks the captured output, exit status, reported diagnostics and the
//! resulting directory structure in a single batch.
//!
//! ```json
//! {
//!   "name": "gen writes output",
//!   "fixture": { "a.tl": "local x: number = 1" },
//!   "subcommand": "gen",
//!   "args": ["a.tl", "-o", "out.lua"],
//!   "expected_exit": 0,
//!   "generated": { "out.lua": true }
//! }
//! ```
//!
//! `expected_exit` is either a plain exit code or an object such as
//! `{"kind": "signal", "code": 9}`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tl_testkit::{
    BatchAssertion, DirectoryNode, ExitKind, ExpectedDiagnostic, FixtureTree, ProcessExit,
    ProcessHarness,
    ResourceLedger, assert_exit, assert_tree, capture, compare, materialize, merge,
    parse_cli_diagnostics,
};

/// One CLI scenario
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Project tree the command runs in
    #[serde(default)]
    pub fixture: FixtureTree,
    pub subcommand: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Exact combined output
    #[serde(default)]
    pub expected_output: Option<String>,
    /// Substrings the combined output must contain
    #[serde(default)]
    pub output_contains: Vec<String>,
    #[serde(default)]
    pub expected_exit: Option<ExpectedExit>,
    /// Diagnostics parsed from the output
    #[serde(default)]
    pub expected_diagnostics: Option<Vec<ExpectedDiagnostic>>,
    /// Entries the command must add to the fixture tree
    #[serde(default)]
    pub generated: Option<DirectoryNode>,
}

/// Expected exit status of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpectedExit {
    /// Normal exit with this code
    Code(i32),
    Status {
        #[serde(default)]
        kind: ExitKind,
        code: i32,
    },
}

impl ExpectedExit {
    pub fn to_process_exit(self) -> ProcessExit {
        match self {
            ExpectedExit::Code(code)
            | ExpectedExit::Status {
                kind: ExitKind::Exit,
                code,
            } => ProcessExit::exited(code),
            ExpectedExit::Status {
                kind: ExitKind::Signal,
                code,
            } => ProcessExit::signaled(code),
        }
    }
}

impl Scenario {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }
}

/// Result of a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    /// One entry per failed check, in the order they were queued
    pub failures: Vec<String>,
    /// Captured combined output
    pub output: String,
    pub exit: Option<ProcessExit>,
    /// Execution time in milliseconds
    pub duration_ms: u64,
}

impl ScenarioResult {
    fn errored(name: &str, error: &anyhow::Error) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            failures: vec![format!("Scenario setup error: {error:#}")],
            output: String::new(),
            exit: None,
            duration_ms: 0,
        }
    }
}

/// Runs scenarios against one compiler configuration
pub struct ScenarioRunner {
    harness: ProcessHarness,
}

impl ScenarioRunner {
    pub fn new(harness: ProcessHarness) -> Self {
        Self { harness }
    }

    /// Run one scenario; setup problems are returned as errors, check
    /// mismatches are recorded in the result
    pub fn run(&self, scenario: &Scenario) -> anyhow::Result<ScenarioResult> {
        let start = Instant::now();
        let mut ledger = ResourceLedger::new(self.harness.config());

        let command = self
            .harness
            .build_command(&scenario.subcommand, scenario.args.iter().cloned())?;
        let root = materialize(&mut ledger, &scenario.fixture)?;
        let run = self.harness.run_in(&root, &command)?;
        let final_tree = capture(&root)?;

        let mut batch = BatchAssertion::new();
        if let Some(expected) = &scenario.expected_output {
            batch.eq("output", expected.clone(), run.output.clone());
        }
        for needle in &scenario.output_contains {
            batch.contains("output", run.output.clone(), needle.clone());
        }
        if let Some(expected) = scenario.expected_exit {
            assert_exit(&mut batch, expected.to_process_exit(), run.status);
        }
        if let Some(expected) = &scenario.expected_diagnostics {
            let actual = parse_cli_diagnostics(&run.output);
            compare("diagnostics", expected, &actual, &mut batch);
        }
        if let Some(generated) = &scenario.generated {
            let initial = DirectoryNode::from(&scenario.fixture);
            assert_tree(&mut batch, "final tree", merge(&initial, generated), final_tree);
        }

        let failures = match batch.assert_all() {
            Ok(()) => Vec::new(),
            Err(failure) => failure
                .failures
                .iter()
                .map(|f| match &f.context {
                    Some(context) => format!("{context}: {}", f.message),
                    None => f.message.clone(),
                })
                .collect(),
        };

        tracing::debug!("scenario '{}' finished with {} failures", scenario.name, failures.len());
        Ok(ScenarioResult {
            name: scenario.name.clone(),
            passed: failures.is_empty(),
            failures,
            output: run.output,
            exit: Some(run.status),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run every scenario, recording setup errors as failed results
    pub fn run_all(&self, scenarios: &[Scenario]) -> ScenarioReport {
        let mut report = ScenarioReport::new(self.harness.config().executable.display().to_string());
        for scenario in scenarios {
            let result = self
                .run(scenario)
                .unwrap_or_else(|e| ScenarioResult::errored(&scenario.name, &e));
            report.add_result(result);
        }
        report
    }
}

/// Collect `*.json` scenario files under `dir`, sorted by path
pub fn discover_scenarios(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("json")
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Summary of a scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_percent: f64,
    pub results: Vec<ScenarioResult>,
    /// Number of failed checks keyed by check label
    pub failure_categories: BTreeMap<String, usize>,
    /// Execution timestamp
    pub timestamp: String,
    /// Compiler the scenarios ran against
    pub compiler: String,
}

impl ScenarioReport {
    pub fn new(compiler: String) -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            pass_percent: 0.0,
            results: Vec::new(),
            failure_categories: BTreeMap::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            compiler,
        }
    }

    pub fn add_result(&mut self, result: ScenarioResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }

        for failure in &result.failures {
            let category = failure
                .split([':', '#'])
                .next()
                .unwrap_or("other")
                .trim()
                .to_string();
            *self.failure_categories.entry(category).or_insert(0) += 1;
        }

        self.results.push(result);
        self.pass_percent = (self.passed as f64 / self.total as f64) * 100.0;
    }

    /// Generate markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# tl Scenario Report\n\n");
        md.push_str(&format!("**Generated**: {}\n\n", self.timestamp));
        md.push_str(&format!("**Compiler**: {}\n\n", self.compiler));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Total**: {}\n", self.total));
        md.push_str(&format!("- **Passed**: {}\n", self.passed));
        md.push_str(&format!("- **Failed**: {}\n", self.failed));
        md.push_str(&format!("- **Pass rate**: {:.2}%\n\n", self.pass_percent));

        if !self.failure_categories.is_empty() {
            md.push_str("## Failures by Check\n\n");
            for (category, count) in &self.failure_categories {
                md.push_str(&format!("- **{category}**: {count}\n"));
            }
            md.push('\n');
        }

        md.push_str("## Results\n\n");
        md.push_str("| Scenario | Status | Exit | Time (ms) |\n");
        md.push_str("|----------|--------|------|-----------|\n");
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            let exit = result
                .exit
                .map_or_else(|| "-".to_string(), |exit| exit.code.to_string());
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                result.name, status, exit, result.duration_ms
            ));
        }

        let failed: Vec<_> = self.results.iter().filter(|r| !r.passed).collect();
        if !failed.is_empty() {
            md.push_str("\n## Failed Scenarios\n\n");
            for result in failed {
                md.push_str(&format!("### {}\n\n", result.name));
                for failure in &result.failures {
                    md.push_str(&format!("- {}\n", failure.replace('\n', " ")));
                }
                md.push('\n');
            }
        }

        md
    }

    /// Save `scenario_report.json` and `scenario_report.md` into `output_dir`
    pub fn save(&self, output_dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(output_dir)?;

        let json = serde_json::to_string_pretty(self)?;
        fs::write(output_dir.join("scenario_report.json"), json)?;
        fs::write(output_dir.join("scenario_report.md"), self.to_markdown())?;

        Ok(())
    }
}
