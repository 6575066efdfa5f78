//! tl test kit
//!
//! Support library for testing the tl compiler end to end.
//! Provides functionality for:
//! - Running the compiler CLI against provisioned project trees
//! - Driving the compiler's embedded API and comparing diagnostics
//! - Batched assertions that report every mismatch at once
//! - Temporary fixtures with guaranteed cleanup
//! - File-read interception and directory structure snapshots

pub mod batch;
pub mod checks;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ledger;
pub mod mockfs;
pub mod process;
pub mod result;
pub mod snapshot;

// Re-export commonly used types
pub use batch::{BatchAssertion, BatchFailure, CheckFailure, CheckResult};
pub use checks::{
    CheckOutcome, Checks, CompilerApi, DeferredCheck, ProcessReport, TypeCheckOptions,
    TypeCheckReport,
};
pub use config::HarnessConfig;
pub use diagnostics::{
    Contains, DiagnosticRecord, Exact, ExpectedDiagnostic, compare, parse_cli_diagnostics,
};
pub use error::{ErrorKind, TestkitError};
pub use ledger::{PendingResource, ResourceLedger};
pub use mockfs::{FileHandle, FileSystem, MockFileSystem, ReadMode, RealFileSystem};
pub use process::{
    CommandSpec, ExitKind, ProcessExit, ProcessHarness, RunOutput, Subcommand, assert_exit,
    shell_quote,
};
pub use result::Result;
pub use snapshot::{
    DirectoryNode, Entry, FixtureEntry, FixtureTree, TreeDifference, assert_tree, capture,
    diff_trees, materialize, merge, populate,
};

/// Initialize the tracing subscriber for logging
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tl_testkit=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_test_writer(),
        )
        .try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
