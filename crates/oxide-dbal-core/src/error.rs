//! Error types for condition building, argument validation, schema
//! parsing and result shaping.

use indexmap::IndexMap;

/// A condition failed validation before any SQL was sent.
///
/// Carries a readable preview of the offending fragment and a description
/// of the value that failed, e.g. `array(3)` for a `BETWEEN` with three
/// bounds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid condition: {message} in `{preview}` (got {actual})")]
pub struct ConditionError {
    /// What went wrong.
    pub message: String,
    /// SQL preview of the condition, values inlined.
    pub preview: String,
    /// Type description of the offending value.
    pub actual: String,
}

impl ConditionError {
    /// Creates a new condition error.
    pub fn new(
        message: impl Into<String>,
        preview: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            preview: preview.into(),
            actual: actual.into(),
        }
    }
}

/// A builder or API argument was malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    /// A name that must be a plain identifier was not.
    #[error("Invalid identifier: '{0}'")]
    Identifier(String),

    /// Sort direction outside the accepted set.
    #[error("Invalid sort direction '{0}' (expected ASC or DESC)")]
    Direction(String),

    /// Unknown operator.
    #[error("Unknown operator: '{0}'")]
    Operator(String),

    /// Unknown return type tag.
    #[error("Unknown return type: '{0}'")]
    ReturnType(String),

    /// Shorthand input that matches none of the accepted shapes.
    #[error("Unrecognized condition shorthand: {0}")]
    Shorthand(String),

    /// Any other malformed argument.
    #[error("{0}")]
    Other(String),
}

/// Errors from building a statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A condition failed validation.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// A builder argument was malformed.
    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

/// Schema document errors, accumulated per table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParserError {
    /// The document is not well-formed XML.
    #[error("Malformed schema document at byte {position}: {message}")]
    Malformed {
        /// Byte offset reported by the reader.
        position: u64,
        /// Reader message.
        message: String,
    },

    /// The document is well-formed but violates the schema structure.
    #[error("Invalid schema document:\n{}", render_table_errors(.errors))]
    Invalid {
        /// Errors keyed by table name (`<root>` for document level).
        errors: IndexMap<String, Vec<String>>,
    },

    /// The document could not be read.
    #[error("Cannot read schema document '{path}': {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// IO error message.
        message: String,
    },
}

/// Errors from shaping a result set into a return type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultError {
    /// A required row or value was not present.
    #[error("Expected a row, result set is empty")]
    RowMissing,

    /// The result set does not have the columns the return type needs.
    #[error("Return type '{return_type}' needs {needed} column(s), result has {actual}")]
    Columns {
        /// Return type tag.
        return_type: String,
        /// Columns required.
        needed: usize,
        /// Columns present.
        actual: usize,
    },
}

/// Renders `table: error` lines, used by [`ParserError::Invalid`] and the
/// sanity check report.
#[must_use]
pub fn render_table_errors(errors: &IndexMap<String, Vec<String>>) -> String {
    errors
        .iter()
        .flat_map(|(table, list)| list.iter().map(move |e| format!("  - {table}: {e}")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_error_message_carries_context() {
        let err = ConditionError::new("expected 2 bounds", "a BETWEEN [1]", "array(1)");
        assert_eq!(
            err.to_string(),
            "Invalid condition: expected 2 bounds in `a BETWEEN [1]` (got array(1))"
        );
        assert_eq!(err.preview, "a BETWEEN [1]");
    }

    #[test]
    fn parser_error_lists_tables() {
        let mut errors = IndexMap::new();
        errors.insert(String::from("clubs"), vec![String::from("no columns")]);
        errors.insert(
            String::from("<root>"),
            vec![String::from("unknown element <tabel>")],
        );
        let rendered = ParserError::Invalid { errors }.to_string();
        assert!(rendered.contains("  - clubs: no columns"));
        assert!(rendered.contains("  - <root>: unknown element <tabel>"));
    }
}
