//! Temporary resource tracking
//!
//! Every temporary file, directory or restoration hook created during a
//! test is registered with a [`ResourceLedger`]. The ledger releases all of
//! them exactly once, when [`ResourceLedger::release`] is called or the
//! ledger is dropped, whichever comes first. Dropping also happens while a
//! failing test unwinds, so cleanup does not depend on the test outcome.

use crate::config::HarnessConfig;
use crate::error::TestkitError;
use crate::result::Result;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;

const NAME_PREFIX: &str = "tl-";

/// A resource scheduled for release at teardown
pub enum PendingResource {
    File(PathBuf),
    Dir(PathBuf),
    Hook(Box<dyn FnOnce()>),
}

impl fmt::Debug for PendingResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingResource::File(path) => f.debug_tuple("File").field(path).finish(),
            PendingResource::Dir(path) => f.debug_tuple("Dir").field(path).finish(),
            PendingResource::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

impl PendingResource {
    fn release(self) {
        let (path, outcome) = match self {
            PendingResource::Hook(hook) => {
                hook();
                return;
            }
            PendingResource::File(path) => {
                let outcome = fs::remove_file(&path);
                (path, outcome)
            }
            PendingResource::Dir(path) => {
                let outcome = fs::remove_dir_all(&path);
                (path, outcome)
            }
        };
        match outcome {
            Ok(()) => tracing::trace!("released {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Owner of every temporary resource created by one test
#[derive(Debug)]
pub struct ResourceLedger {
    temp_root: PathBuf,
    source_extension: String,
    output_extension: String,
    pending: Vec<PendingResource>,
}

impl ResourceLedger {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            temp_root: config.temp_root.clone(),
            source_extension: config.source_extension.clone(),
            output_extension: config.output_extension.clone(),
            pending: Vec::new(),
        }
    }

    /// Directory new temporary resources are created under
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Number of resources still awaiting release
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Schedule a file for deletion
    pub fn register_file(&mut self, path: impl Into<PathBuf>) {
        self.pending.push(PendingResource::File(path.into()));
    }

    /// Schedule a directory for recursive deletion
    pub fn register_dir(&mut self, path: impl Into<PathBuf>) {
        self.pending.push(PendingResource::Dir(path.into()));
    }

    /// Schedule a callback to run at teardown
    pub fn on_release(&mut self, hook: impl FnOnce() + 'static) {
        self.pending.push(PendingResource::Hook(Box::new(hook)));
    }

    /// Write `content` to `<temp_root>/<random>.<extension>`
    ///
    /// The extension defaults to the compiler's source extension. The
    /// compiled-output sibling (same stem, output extension) is scheduled
    /// for deletion as well.
    pub fn write_source(&mut self, content: &str, extension: Option<&str>) -> Result<PathBuf> {
        let extension = extension.unwrap_or(&self.source_extension);
        let suffix = format!(".{extension}");

        let mut file = Builder::new()
            .prefix(NAME_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.temp_root)
            .map_err(|e| TestkitError::io(&self.temp_root, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| TestkitError::io(file.path(), e))?;
        let (_, path) = file
            .keep()
            .map_err(|e| TestkitError::io(&self.temp_root, e.error))?;

        tracing::debug!("created temporary source {}", path.display());
        self.register_file(&path);
        self.register_file(path.with_extension(&self.output_extension));
        Ok(path)
    }

    /// Create an empty directory `<temp_root>/<random>/`
    pub fn create_dir(&mut self) -> Result<PathBuf> {
        let dir = Builder::new()
            .prefix(NAME_PREFIX)
            .tempdir_in(&self.temp_root)
            .map_err(|e| TestkitError::io(&self.temp_root, e))?;
        let path = dir.keep();

        tracing::debug!("created temporary directory {}", path.display());
        self.register_dir(&path);
        Ok(path)
    }

    /// Release every pending resource, most recent first
    pub fn release(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!("releasing {} temporary resources", self.pending.len());
        }
        while let Some(resource) = self.pending.pop() {
            resource.release();
        }
    }
}

impl Drop for ResourceLedger {
    fn drop(&mut self) {
        self.release();
    }
}
