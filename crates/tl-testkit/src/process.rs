//! Running the compiler CLI as a subprocess
//!
//! A [`CommandSpec`] is rendered as one shell command line:
//!
//! ```text
//! LUA_CPATH='...' LUA_PATH='...' 'lua' '/abs/path/tl' check 'a.tl' 'my file.tl'
//! ```
//!
//! and executed through `sh -c` with stderr folded into stdout, so the
//! captured text preserves the interleaving the user would see. The target
//! directory is handed to the child process; the test process's own working
//! directory is never changed.

use crate::batch::BatchAssertion;
use crate::config::HarnessConfig;
use crate::error::TestkitError;
use crate::result::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

/// Compiler subcommands the harness may invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subcommand {
    Gen,
    Check,
    Run,
    Build,
}

impl Subcommand {
    pub const ALL: [Subcommand; 4] = [
        Subcommand::Gen,
        Subcommand::Check,
        Subcommand::Run,
        Subcommand::Build,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subcommand::Gen => "gen",
            Subcommand::Check => "check",
            Subcommand::Run => "run",
            Subcommand::Build => "build",
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subcommand {
    type Err = TestkitError;

    fn from_str(s: &str) -> Result<Self> {
        Subcommand::ALL
            .into_iter()
            .find(|sub| sub.as_str() == s)
            .ok_or_else(|| TestkitError::UnknownSubcommand {
                name: s.to_string(),
            })
    }
}

/// Environment names are emitted unquoted, so only `[A-Za-z_][A-Za-z0-9_]*`
/// is accepted
fn validate_env_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TestkitError::config(format!(
            "invalid environment variable name {name:?}"
        )))
    }
}

/// Wrap `arg` in single quotes so the shell passes it through verbatim
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// A fully resolved compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Environment prefix
    pub env: BTreeMap<String, String>,
    pub interpreter: String,
    pub executable: PathBuf,
    pub subcommand: Subcommand,
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Render as a single shell-invocable string
    pub fn to_shell(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={}", shell_quote(value)))
            .collect();
        parts.push(shell_quote(&self.interpreter));
        parts.push(shell_quote(&self.executable.to_string_lossy()));
        parts.push(self.subcommand.as_str().to_string());
        parts.extend(self.args.iter().map(|arg| shell_quote(arg)));
        parts.join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

/// How the process ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitKind {
    /// Normal termination with an exit code
    #[default]
    Exit,
    /// Terminated by a signal
    Signal,
}

/// Exit classification of a finished process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
    pub success: bool,
    pub kind: ExitKind,
    /// Exit code, or signal number when `kind` is [`ExitKind::Signal`]
    pub code: i32,
}

impl ProcessExit {
    /// Successful normal exit
    pub const SUCCESS: ProcessExit = ProcessExit {
        success: true,
        kind: ExitKind::Exit,
        code: 0,
    };

    /// Normal exit with `code`
    pub fn exited(code: i32) -> Self {
        Self {
            success: code == 0,
            kind: ExitKind::Exit,
            code,
        }
    }

    /// Termination by `signal`
    pub fn signaled(signal: i32) -> Self {
        Self {
            success: false,
            kind: ExitKind::Signal,
            code: signal,
        }
    }

    fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::signaled(signal);
            }
        }
        Self {
            success: status.success(),
            kind: ExitKind::Exit,
            code: status.code().unwrap_or(-1),
        }
    }
}

/// Captured result of one CLI run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Interleaved stdout and stderr
    pub output: String,
    pub status: ProcessExit,
}

/// Builds and runs compiler invocations
#[derive(Debug, Clone)]
pub struct ProcessHarness {
    config: HarnessConfig,
}

impl ProcessHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Resolve a command line; fails before anything is spawned when
    /// `subcommand` is not one of gen/check/run/build
    pub fn build_command<I, S>(&self, subcommand: &str, args: I) -> Result<CommandSpec>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subcommand: Subcommand = subcommand.parse()?;
        for name in self.config.env.keys() {
            validate_env_name(name)?;
        }

        let executable = if self.config.executable.is_absolute() {
            self.config.executable.clone()
        } else {
            let cwd = std::env::current_dir().map_err(|e| TestkitError::io(".", e))?;
            cwd.join(&self.config.executable)
        };

        let spec = CommandSpec {
            env: self.config.env.clone(),
            interpreter: self.config.interpreter.clone(),
            executable,
            subcommand,
            args: args.into_iter().map(Into::into).collect(),
        };
        tracing::debug!("built command: {}", spec);
        Ok(spec)
    }

    /// Run `command` with `directory` as its working directory
    ///
    /// Blocks until the process exits and its output is drained; no timeout
    /// is applied.
    pub fn run_in(&self, directory: &Path, command: &CommandSpec) -> Result<RunOutput> {
        let line = format!("{} 2>&1", command.to_shell());
        let output = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .current_dir(directory)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| TestkitError::SpawnError {
                command: line.clone(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let status = ProcessExit::from_status(output.status);

        tracing::debug!(
            "{} exited in {}: {:?} ({} bytes of output)",
            command.subcommand,
            directory.display(),
            status,
            text.len()
        );
        Ok(RunOutput {
            output: text,
            status,
        })
    }

    /// Build and run in one step
    pub fn run<I, S>(&self, directory: &Path, subcommand: &str, args: I) -> Result<RunOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.build_command(subcommand, args)?;
        self.run_in(directory, &command)
    }
}

/// Queue checks on the exit classification of a run
///
/// Exit-status introspection is only reliable on Unix; elsewhere this
/// queues nothing.
pub fn assert_exit<'a>(batch: &mut BatchAssertion<'a>, expected: ProcessExit, actual: ProcessExit) {
    if cfg!(unix) {
        batch.eq("exit success", expected.success, actual.success);
        batch.eq("exit kind", expected.kind, actual.kind);
        batch.eq("exit code", expected.code, actual.code);
    } else {
        tracing::debug!("skipping exit status checks on this platform");
    }
}
