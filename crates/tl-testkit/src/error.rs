//! Error types for harness setup and I/O
//!
//! Assertion mismatches are not represented here; they are collected by
//! [`crate::batch::BatchAssertion`] and reported as a
//! [`crate::batch::BatchFailure`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum TestkitError {
    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler process could not be spawned or awaited
    #[error("Failed to run '{command}': {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Subcommand outside of gen/check/run/build
    #[error("Unknown subcommand '{name}' (expected one of gen, check, run, build)")]
    UnknownSubcommand { name: String },

    /// A stub file handle was asked for a read mode it does not serve
    #[error("Unsupported read mode: {mode}")]
    UnsupportedReadMode { mode: String },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Malformed fixture description
    #[error("Fixture error: {message}")]
    FixtureError { message: String },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Process,
    Usage,
    Config,
    Fixture,
}

impl TestkitError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TestkitError::IoError { .. } => ErrorKind::Io,
            TestkitError::SpawnError { .. } => ErrorKind::Process,
            TestkitError::UnknownSubcommand { .. } => ErrorKind::Usage,
            TestkitError::UnsupportedReadMode { .. } => ErrorKind::Usage,
            TestkitError::ConfigError { .. } => ErrorKind::Config,
            TestkitError::FixtureError { .. } => ErrorKind::Fixture,
        }
    }

    /// Setup failures abort a scenario immediately instead of being
    /// aggregated with assertion failures.
    pub fn is_setup_failure(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Usage)
    }

    /// Create an IO error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a fixture error
    pub fn fixture(message: impl Into<String>) -> Self {
        Self::FixtureError {
            message: message.into(),
        }
    }
}
