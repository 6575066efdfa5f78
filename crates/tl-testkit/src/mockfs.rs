//! File-read interception
//!
//! Components that read files take a [`FileSystem`]. Tests hand them a
//! [`MockFileSystem`], which serves canned content for paths matching a
//! registered key and forwards everything else to the wrapped filesystem.
//!
//! Matching splits the requested path on `/` and tries suffixes of the
//! segment list from the shortest (just the file name) to the longest (the
//! whole path). The first suffix present in the table wins, so a key
//! holding a bare file name shadows a longer key for the same file.

use crate::error::TestkitError;
use crate::ledger::ResourceLedger;
use crate::result::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::rc::Rc;

/// How much of a file a read call consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// The entire remaining content
    All,
    /// The next line, without its terminator
    Line,
    /// Up to the given number of bytes; a read that ends inside a
    /// multi-byte character is an error
    Bytes(usize),
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::All => f.write_str("all"),
            ReadMode::Line => f.write_str("line"),
            ReadMode::Bytes(n) => write!(f, "bytes({n})"),
        }
    }
}

/// An open, readable file
pub trait FileHandle {
    fn read(&mut self, mode: ReadMode) -> Result<String>;

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Capability to open a path for reading
pub trait FileSystem {
    fn open(&self, path: &Path) -> Result<Box<dyn FileHandle>>;

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let mut handle = self.open(path)?;
        let content = handle.read(ReadMode::All)?;
        handle.close()?;
        Ok(content)
    }
}

/// The operating system's filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

struct RealFileHandle {
    path: String,
    reader: BufReader<File>,
}

impl FileHandle for RealFileHandle {
    fn read(&mut self, mode: ReadMode) -> Result<String> {
        let io_err = |e| TestkitError::io(&self.path, e);
        match mode {
            ReadMode::All => {
                let mut content = String::new();
                self.reader.read_to_string(&mut content).map_err(io_err)?;
                Ok(content)
            }
            ReadMode::Line => {
                let mut line = String::new();
                self.reader.read_line(&mut line).map_err(io_err)?;
                Ok(line.trim_end_matches(['\r', '\n']).to_string())
            }
            ReadMode::Bytes(n) => {
                let mut buf = Vec::new();
                (&mut self.reader)
                    .take(n as u64)
                    .read_to_end(&mut buf)
                    .map_err(io_err)?;
                String::from_utf8(buf)
                    .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
            }
        }
    }
}

impl FileSystem for RealFileSystem {
    fn open(&self, path: &Path) -> Result<Box<dyn FileHandle>> {
        let file = File::open(path).map_err(|e| TestkitError::io(path, e))?;
        Ok(Box::new(RealFileHandle {
            path: path.display().to_string(),
            reader: BufReader::new(file),
        }))
    }
}

/// Read-only stub serving one canned string
struct StubFileHandle {
    content: String,
}

impl FileHandle for StubFileHandle {
    fn read(&mut self, mode: ReadMode) -> Result<String> {
        match mode {
            ReadMode::All => Ok(self.content.clone()),
            other => Err(TestkitError::UnsupportedReadMode {
                mode: other.to_string(),
            }),
        }
    }
}

type ContentTable = Rc<RefCell<HashMap<String, String>>>;

/// Filesystem serving canned content for matching paths
pub struct MockFileSystem<F: FileSystem = RealFileSystem> {
    inner: F,
    files: ContentTable,
}

impl MockFileSystem<RealFileSystem> {
    /// Mock over the real filesystem
    pub fn new<K, V>(files: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::wrap(RealFileSystem, files)
    }

    /// Mock over the real filesystem whose table is cleared when `ledger`
    /// releases its resources
    pub fn install<K, V>(ledger: &mut ResourceLedger, files: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mock = Self::new(files);
        let table = Rc::clone(&mock.files);
        ledger.on_release(move || {
            tracing::trace!("restoring passthrough file reads");
            table.borrow_mut().clear();
        });
        mock
    }
}

impl<F: FileSystem> MockFileSystem<F> {
    /// Mock over an arbitrary inner filesystem
    pub fn wrap<K, V>(inner: F, files: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let files = files
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner,
            files: Rc::new(RefCell::new(files)),
        }
    }

    /// Register or replace canned content for `key`
    pub fn insert(&self, key: impl Into<String>, content: impl Into<String>) {
        self.files.borrow_mut().insert(key.into(), content.into());
    }

    /// Canned content `path` resolves to, shortest matching suffix first
    pub fn resolve(&self, path: &str) -> Option<String> {
        let files = self.files.borrow();
        if files.is_empty() {
            return None;
        }
        let segments: Vec<&str> = path.split('/').collect();
        (1..=segments.len())
            .map(|len| segments[segments.len() - len..].join("/"))
            .find_map(|suffix| files.get(&suffix).cloned())
    }
}

impl<F: FileSystem> FileSystem for MockFileSystem<F> {
    fn open(&self, path: &Path) -> Result<Box<dyn FileHandle>> {
        let requested = path.to_string_lossy();
        match self.resolve(&requested) {
            Some(content) => {
                tracing::trace!("serving canned content for {}", requested);
                Ok(Box::new(StubFileHandle { content }))
            }
            None => self.inner.open(path),
        }
    }
}
