//! Diagnostic records and the partial-match comparator
//!
//! Expected diagnostics only constrain the fields a test cares about:
//! `line`/`column` match exactly, `message`/`filename` match by substring
//! containment, and unset fields match anything. Lists are compared
//! position by position and must have the same length.

use crate::batch::BatchAssertion;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A compiler-emitted error, warning or unresolved-reference note
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl DiagnosticRecord {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
            message: Some(message.into()),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = |value: Option<u32>| value.map_or_else(|| "?".to_string(), |v| v.to_string());
        write!(
            f,
            "{}:{}:{}: {}",
            self.filename.as_deref().unwrap_or("<unknown>"),
            position(self.line),
            position(self.column),
            self.message.as_deref().unwrap_or("")
        )
    }
}

/// Exact-or-wildcard matcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Exact<T> {
    #[default]
    Any,
    Is(T),
}

impl<T: PartialEq + Copy> Exact<T> {
    pub fn matches(&self, actual: Option<T>) -> bool {
        match self {
            Exact::Any => true,
            Exact::Is(expected) => actual == Some(*expected),
        }
    }
}

impl<T> From<Option<T>> for Exact<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Exact::Any, Exact::Is)
    }
}

/// Substring-or-wildcard matcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Contains {
    #[default]
    Any,
    Substring(String),
}

impl Contains {
    /// A missing actual value is treated as the empty string
    pub fn matches(&self, actual: Option<&str>) -> bool {
        match self {
            Contains::Any => true,
            Contains::Substring(needle) => actual.unwrap_or("").contains(needle.as_str()),
        }
    }
}

impl From<Option<String>> for Contains {
    fn from(value: Option<String>) -> Self {
        value.map_or(Contains::Any, Contains::Substring)
    }
}

/// Expected diagnostic: one matcher per field
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "DiagnosticRecord")]
pub struct ExpectedDiagnostic {
    pub line: Exact<u32>,
    pub column: Exact<u32>,
    pub message: Contains,
    pub filename: Contains,
}

impl ExpectedDiagnostic {
    /// Matches any diagnostic
    pub fn any() -> Self {
        Self::default()
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = Exact::Is(line);
        self
    }

    pub fn column(mut self, column: u32) -> Self {
        self.column = Exact::Is(column);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Contains::Substring(message.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Contains::Substring(filename.into());
        self
    }

    /// Whether every constrained field is satisfied by `actual`
    pub fn matches(&self, actual: &DiagnosticRecord) -> bool {
        self.line.matches(actual.line)
            && self.column.matches(actual.column)
            && self.message.matches(actual.message.as_deref())
            && self.filename.matches(actual.filename.as_deref())
    }
}

impl From<DiagnosticRecord> for ExpectedDiagnostic {
    fn from(record: DiagnosticRecord) -> Self {
        Self {
            line: record.line.into(),
            column: record.column.into(),
            message: record.message.into(),
            filename: record.filename.into(),
        }
    }
}

/// Queue the checks comparing `expected` against `actual` onto `batch`
///
/// Every check is labeled with `category`, the 1-based index and the field
/// being compared, e.g. `type errors #2 message`.
pub fn compare<'a>(
    category: &str,
    expected: &[ExpectedDiagnostic],
    actual: &[DiagnosticRecord],
    batch: &mut BatchAssertion<'a>,
) {
    batch.eq(
        format!("{category}: number of diagnostics"),
        expected.len(),
        actual.len(),
    );

    let empty = DiagnosticRecord::default();

    for (i, exp) in expected.iter().enumerate() {
        let act = actual.get(i).unwrap_or(&empty);
        let label = |field: &str| format!("{category} #{} {field}", i + 1);

        if let Exact::Is(line) = exp.line {
            batch.eq(label("line"), Some(line), act.line);
        }
        if let Exact::Is(column) = exp.column {
            batch.eq(label("column"), Some(column), act.column);
        }
        if let Contains::Substring(message) = &exp.message {
            batch.contains(
                label("message"),
                act.message.clone().unwrap_or_default(),
                message.clone(),
            );
        }
        if let Contains::Substring(filename) = &exp.filename {
            batch.contains(
                label("filename"),
                act.filename.clone().unwrap_or_default(),
                filename.clone(),
            );
        }
    }

    for (i, extra) in actual.iter().enumerate().skip(expected.len()) {
        batch.fail(
            format!("{category} #{}", i + 1),
            format!("unexpected diagnostic: {extra}"),
        );
    }
}

fn diagnostic_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+):\s?(?P<msg>.*)$")
            .expect("diagnostic pattern is valid")
    })
}

/// Extract diagnostics from the compiler's textual report
///
/// Recognizes lines shaped like `a.tl:1:19: got string, expected number`;
/// every other line (banners, summaries) is skipped.
pub fn parse_cli_diagnostics(output: &str) -> Vec<DiagnosticRecord> {
    output
        .lines()
        .filter_map(|line| {
            let caps = diagnostic_line_pattern().captures(line.trim_end())?;
            Some(DiagnosticRecord {
                line: caps["line"].parse().ok(),
                column: caps["col"].parse().ok(),
                message: Some(caps["msg"].to_string()),
                filename: Some(caps["file"].to_string()),
            })
        })
        .collect()
}
