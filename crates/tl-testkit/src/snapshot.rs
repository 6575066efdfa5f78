//! Directory fixtures and structure snapshots
//!
//! A [`FixtureTree`] describes files (with content) and subdirectories to
//! write to disk. A [`DirectoryNode`] records only which names exist and
//! whether each is a file or a directory; it is what [`capture`] returns
//! and what expected trees are compared against.

use crate::batch::BatchAssertion;
use crate::error::TestkitError;
use crate::ledger::ResourceLedger;
use crate::result::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file with content or a nested fixture directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureEntry {
    File(String),
    Dir(FixtureTree),
}

/// Files and subdirectories to materialize, keyed by base name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureTree(BTreeMap<String, FixtureEntry>);

impl FixtureTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with `content`
    pub fn file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.0.insert(name.into(), FixtureEntry::File(content.into()));
        self
    }

    /// Add a subdirectory
    pub fn dir(mut self, name: impl Into<String>, tree: FixtureTree) -> Self {
        self.0.insert(name.into(), FixtureEntry::Dir(tree));
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FixtureEntry)> {
        self.0.iter()
    }

    /// Parse from JSON: strings are file contents, objects are directories
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TestkitError::fixture(e.to_string()))
    }
}

/// Kind of a captured entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File,
    Dir(DirectoryNode),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Marker(bool),
    Dir(DirectoryNode),
}

impl TryFrom<RawEntry> for Entry {
    type Error = String;

    fn try_from(raw: RawEntry) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawEntry::Marker(true) => Ok(Entry::File),
            RawEntry::Marker(false) => Err("file markers must be `true`".to_string()),
            RawEntry::Dir(node) => Ok(Entry::Dir(node)),
        }
    }
}

impl From<Entry> for RawEntry {
    fn from(entry: Entry) -> Self {
        match entry {
            Entry::File => RawEntry::Marker(true),
            Entry::Dir(node) => RawEntry::Dir(node),
        }
    }
}

impl Serialize for Entry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawEntry::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawEntry::deserialize(deserializer)?;
        Entry::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Presence map of a directory tree
///
/// Equality is structural and independent of listing order. Keys are base
/// names; deserialization rejects anything containing a path separator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectoryNode(BTreeMap<String, Entry>);

impl<'de> Deserialize<'de> for DirectoryNode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = BTreeMap::<String, Entry>::deserialize(deserializer)?;
        for name in entries.keys() {
            validate_name(name).map_err(serde::de::Error::custom)?;
        }
        Ok(DirectoryNode(entries))
    }
}

impl DirectoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file marker
    pub fn file(mut self, name: impl Into<String>) -> Self {
        self.0.insert(name.into(), Entry::File);
        self
    }

    /// Add a subdirectory
    pub fn dir(mut self, name: impl Into<String>, node: DirectoryNode) -> Self {
        self.0.insert(name.into(), Entry::Dir(node));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse from JSON: `true` marks a file, objects are directories
    ///
    /// Nested paths such as `"build/out.lua"` are rejected; spell them as
    /// nested objects.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TestkitError::fixture(e.to_string()))
    }

    fn insert_path(&mut self, components: &[String], leaf: Entry) {
        let Some((name, parents)) = components.split_last() else {
            return;
        };
        let mut node = self;
        for parent in parents {
            let entry = node
                .0
                .entry(parent.clone())
                .or_insert_with(|| Entry::Dir(DirectoryNode::new()));
            node = match entry {
                Entry::Dir(child) => child,
                Entry::File => return,
            };
        }
        node.0.entry(name.clone()).or_insert(leaf);
    }
}

impl From<&FixtureTree> for DirectoryNode {
    fn from(tree: &FixtureTree) -> Self {
        let entries = tree
            .entries()
            .map(|(name, entry)| {
                let entry = match entry {
                    FixtureEntry::File(_) => Entry::File,
                    FixtureEntry::Dir(sub) => Entry::Dir(DirectoryNode::from(sub)),
                };
                (name.clone(), entry)
            })
            .collect();
        DirectoryNode(entries)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(TestkitError::fixture(format!(
            "invalid fixture entry name {name:?}: expected a plain base name"
        )));
    }
    Ok(())
}

/// Write `tree` into `root`, creating `root` first if needed
pub fn populate(root: &Path, tree: &FixtureTree) -> Result<()> {
    fs::create_dir_all(root).map_err(|e| TestkitError::io(root, e))?;
    for (name, entry) in tree.entries() {
        validate_name(name)?;
        let path = root.join(name);
        match entry {
            FixtureEntry::File(content) => {
                fs::write(&path, content).map_err(|e| TestkitError::io(&path, e))?;
            }
            FixtureEntry::Dir(sub) => populate(&path, sub)?,
        }
    }
    Ok(())
}

/// Materialize `tree` into a fresh temporary directory owned by `ledger`
pub fn materialize(ledger: &mut ResourceLedger, tree: &FixtureTree) -> Result<PathBuf> {
    let root = ledger.create_dir()?;
    populate(&root, tree)?;
    tracing::debug!("materialized fixture in {}", root.display());
    Ok(root)
}

/// Capture the structure under `root`
pub fn capture(root: &Path) -> Result<DirectoryNode> {
    let mut node = DirectoryNode::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            TestkitError::io(path, e.into())
        })?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let leaf = if entry.file_type().is_dir() {
            Entry::Dir(DirectoryNode::new())
        } else {
            Entry::File
        };
        node.insert_path(&components, leaf);
    }
    Ok(node)
}

/// Union of `base` and `overlay`; entries of `base` are never removed
///
/// Where both trees hold a directory under the same name the directories
/// are merged; any other clash keeps the `base` entry.
pub fn merge(base: &DirectoryNode, overlay: &DirectoryNode) -> DirectoryNode {
    let mut merged = base.clone();
    merge_into(&mut merged, overlay);
    merged
}

fn merge_into(target: &mut DirectoryNode, overlay: &DirectoryNode) {
    for (name, entry) in &overlay.0 {
        match (target.0.get_mut(name), entry) {
            (None, _) => {
                target.0.insert(name.clone(), entry.clone());
            }
            (Some(Entry::Dir(existing)), Entry::Dir(sub)) => merge_into(existing, sub),
            (Some(_), _) => {}
        }
    }
}

/// One path at which two trees disagree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDifference {
    /// Expected but absent
    Missing(String),
    /// Present but not expected
    Extra(String),
    /// Expected a directory, found a file
    NotADirectory(String),
    /// Expected a file, found a directory
    NotAFile(String),
}

impl fmt::Display for TreeDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeDifference::Missing(path) => write!(f, "missing: {path}"),
            TreeDifference::Extra(path) => write!(f, "extra: {path}"),
            TreeDifference::NotADirectory(path) => write!(f, "expected directory, found file: {path}"),
            TreeDifference::NotAFile(path) => write!(f, "expected file, found directory: {path}"),
        }
    }
}

/// Every path at which `actual` differs from `expected`, in sorted order
pub fn diff_trees(expected: &DirectoryNode, actual: &DirectoryNode) -> Vec<TreeDifference> {
    let mut differences = Vec::new();
    diff_into("", expected, actual, &mut differences);
    differences
}

fn diff_into(
    prefix: &str,
    expected: &DirectoryNode,
    actual: &DirectoryNode,
    differences: &mut Vec<TreeDifference>,
) {
    let mut names: Vec<&String> = expected.0.keys().chain(actual.0.keys()).collect();
    names.sort();
    names.dedup();

    for name in names {
        let path = format!("{prefix}{name}");
        match (expected.0.get(name), actual.0.get(name)) {
            (Some(_), None) => differences.push(TreeDifference::Missing(path)),
            (None, Some(_)) => differences.push(TreeDifference::Extra(path)),
            (Some(Entry::Dir(_)), Some(Entry::File)) => {
                differences.push(TreeDifference::NotADirectory(path))
            }
            (Some(Entry::File), Some(Entry::Dir(_))) => {
                differences.push(TreeDifference::NotAFile(path))
            }
            (Some(Entry::Dir(exp)), Some(Entry::Dir(act))) => {
                diff_into(&format!("{path}/"), exp, act, differences)
            }
            (Some(Entry::File), Some(Entry::File)) | (None, None) => {}
        }
    }
}

/// Queue a deep-equality check of two trees on `batch`
pub fn assert_tree<'a>(
    batch: &mut BatchAssertion<'a>,
    context: impl Into<String>,
    expected: DirectoryNode,
    actual: DirectoryNode,
) {
    batch.add_labeled(context, move || {
        let differences = diff_trees(&expected, &actual);
        if differences.is_empty() {
            Ok(())
        } else {
            Err(differences
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"))
        }
    });
}
