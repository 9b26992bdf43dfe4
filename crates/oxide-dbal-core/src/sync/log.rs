//! Human-readable migration log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// A category banner.
    Section,
    /// Describes the statement that follows.
    Heading,
    /// SQL text.
    Query,
    /// Free-form note: warnings, failures, the closing summary.
    Message,
}

/// One log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Line kind.
    pub kind: LogKind,
    /// Line text.
    pub body: String,
}

/// Ordered log of a sync run. Dry runs and real runs produce the same
/// entries for the same plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationLog {
    entries: Vec<LogEntry>,
}

impl MigrationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: LogKind, body: impl Into<String>) {
        self.entries.push(LogEntry {
            kind,
            body: body.into(),
        });
    }

    /// Appends a section banner.
    pub fn section(&mut self, body: impl Into<String>) {
        self.push(LogKind::Section, body);
    }

    /// Appends a heading.
    pub fn heading(&mut self, body: impl Into<String>) {
        self.push(LogKind::Heading, body);
    }

    /// Appends SQL text.
    pub fn query(&mut self, body: impl Into<String>) {
        self.push(LogKind::Query, body);
    }

    /// Appends a message.
    pub fn message(&mut self, body: impl Into<String>) {
        self.push(LogKind::Message, body);
    }

    /// All entries in order.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries of one kind.
    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.body.as_str())
    }

    /// Returns `true` if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain-text rendering, one entry per line (queries end with `;`).
    #[must_use]
    pub fn render_plain(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MigrationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            match entry.kind {
                LogKind::Section => {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    writeln!(f, "== {} ==", entry.body)?;
                }
                LogKind::Heading => writeln!(f, "-- {}", entry.body)?,
                LogKind::Query => writeln!(f, "{};", entry.body)?,
                LogKind::Message => writeln!(f, "! {}", entry.body)?,
            }
        }
        Ok(())
    }
}
