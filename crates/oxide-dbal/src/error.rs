//! Error types for the driver layer.
//!
//! Driver failures never surface as raw `sqlx::Error`: they are classified
//! by SQLSTATE class into a [`QueryError`] that also carries the statement
//! text and its parameters.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use oxide_dbal_core::error::{ArgumentError, BuildError, ConditionError, ParserError, ResultError};
use oxide_dbal_core::SqlValue;
use regex::Regex;

/// Longest SQL text, parameter list or message kept in a [`QueryError`].
pub const MAX_DETAIL_LEN: usize = 500;

static MYSQL_DUPLICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duplicate entry '(.*)' for key '([^']+)'").expect("valid duplicate entry pattern")
});
static NAMED_CONSTRAINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"constraint "([^"]+)""#).expect("valid constraint pattern"));
static POSTGRES_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Key \((.*)\)=\((.*)\)").expect("valid key detail pattern"));
static SQLITE_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"constraint failed: (\S+)").expect("valid sqlite constraint pattern")
});

/// Errors raised by the driver layer.
#[derive(Debug, thiserror::Error)]
pub enum DbalError {
    /// The connection could not be established.
    #[error("Cannot connect to '{url}': {message}")]
    Connection {
        /// URL with credentials removed.
        url: String,
        /// Driver message.
        message: String,
    },

    /// A statement failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A required row was not present.
    #[error("Expected a row, result set is empty")]
    RowMissing,

    /// A condition failed validation before any SQL was sent.
    #[error(transparent)]
    InvalidCondition(#[from] ConditionError),

    /// An argument was malformed.
    #[error(transparent)]
    InvalidArgument(#[from] ArgumentError),

    /// A schema document was malformed or invalid.
    #[error(transparent)]
    Parser(#[from] ParserError),

    /// An advisory lock was not acquired in time.
    #[error("Could not acquire lock '{name}' within {timeout:?}")]
    Lock {
        /// Lock name.
        name: String,
        /// How long acquisition was attempted.
        timeout: Duration,
    },

    /// A row could not be decoded into the requested type.
    #[error("Cannot decode row: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<BuildError> for DbalError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Condition(e) => Self::InvalidCondition(e),
            BuildError::Argument(e) => Self::InvalidArgument(e),
        }
    }
}

impl From<ResultError> for DbalError {
    fn from(err: ResultError) -> Self {
        match err {
            ResultError::RowMissing => Self::RowMissing,
            other @ ResultError::Columns { .. } => {
                Self::InvalidArgument(ArgumentError::Other(other.to_string()))
            }
        }
    }
}

impl DbalError {
    pub(crate) fn connection(url: &str, err: &sqlx::Error) -> Self {
        Self::Connection {
            url: redact_url(url),
            message: err.to_string(),
        }
    }

    /// The query error, if this is one.
    #[must_use]
    pub const fn as_query(&self) -> Option<&QueryError> {
        match self {
            Self::Query(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DbalError>;

/// Classification of a failed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// SQLSTATE class 22: a value was malformed or out of range.
    Data,
    /// SQLSTATE class 23: a uniqueness or foreign key violation.
    Constraint {
        /// Violated key or constraint, when the message names it.
        key: Option<String>,
        /// Offending value, when the message shows it.
        value: Option<String>,
    },
    /// SQLSTATE class 25, or misuse of the transaction API.
    Transaction,
    /// Anything else.
    Other,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("Data error"),
            Self::Constraint { key: Some(key), .. } => write!(f, "Constraint violation on '{key}'"),
            Self::Constraint { key: None, .. } => f.write_str("Constraint violation"),
            Self::Transaction => f.write_str("Transaction error"),
            Self::Other => f.write_str("Query error"),
        }
    }
}

/// A statement failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message} [SQL: {sql}] [params: {params}]")]
pub struct QueryError {
    /// Classification.
    pub kind: QueryErrorKind,
    /// SQLSTATE, or the engine's numeric code when it has no SQLSTATE.
    pub sqlstate: Option<String>,
    /// Driver message, truncated.
    pub message: String,
    /// Statement text, truncated.
    pub sql: String,
    /// Rendered parameter list, truncated.
    pub params: String,
}

impl QueryError {
    /// Creates an error of `kind` for `sql`.
    pub fn new(
        kind: QueryErrorKind,
        message: impl Into<String>,
        sql: &str,
        params: &[SqlValue],
    ) -> Self {
        Self {
            kind,
            sqlstate: None,
            message: truncate(&message.into()),
            sql: truncate(sql),
            params: truncate(&render_params(params)),
        }
    }

    /// Transaction API misuse.
    pub fn transaction(message: impl Into<String>, sql: &str) -> Self {
        Self::new(QueryErrorKind::Transaction, message, sql, &[])
    }

    /// Classifies a driver error raised by `sql`.
    #[must_use]
    pub fn from_sqlx(err: &sqlx::Error, sql: &str, params: &[SqlValue]) -> Self {
        let (sqlstate, message) = match err {
            sqlx::Error::Database(db) => (db.code().map(|c| c.into_owned()), db.message().to_string()),
            other => (None, other.to_string()),
        };
        let kind = classify(sqlstate.as_deref(), &message);
        Self {
            sqlstate,
            ..Self::new(kind, message, sql, params)
        }
    }

    /// Whether this is a constraint violation.
    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self.kind, QueryErrorKind::Constraint { .. })
    }
}

fn classify(code: Option<&str>, message: &str) -> QueryErrorKind {
    let class = match code {
        Some(code) if code.len() == 5 => code[..2].to_string(),
        // SQLite reports numeric result codes; the low byte is the primary code
        Some(code) => match code.parse::<u32>().map(|n| n & 0xff) {
            Ok(19) => String::from("23"),
            Ok(20) => String::from("22"),
            _ => String::new(),
        },
        None => String::new(),
    };
    match class.as_str() {
        "22" => QueryErrorKind::Data,
        "23" => {
            let (key, value) = constraint_details(message);
            QueryErrorKind::Constraint { key, value }
        }
        "25" => QueryErrorKind::Transaction,
        _ => QueryErrorKind::Other,
    }
}

fn constraint_details(message: &str) -> (Option<String>, Option<String>) {
    if let Some(caps) = MYSQL_DUPLICATE.captures(message) {
        return (Some(caps[2].to_string()), Some(caps[1].to_string()));
    }
    if let Some(caps) = NAMED_CONSTRAINT.captures(message) {
        let value = POSTGRES_KEY.captures(message).map(|k| k[2].to_string());
        return (Some(caps[1].to_string()), value);
    }
    if let Some(caps) = SQLITE_CONSTRAINT.captures(message) {
        return (Some(caps[1].to_string()), None);
    }
    (None, None)
}

fn render_params(params: &[SqlValue]) -> String {
    let items: Vec<String> = params.iter().map(SqlValue::to_sql_inline).collect();
    format!("[{}]", items.join(", "))
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_DETAIL_LEN {
        return text.to_string();
    }
    let mut end = MAX_DETAIL_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Strips the password from a connection URL.
pub(crate) fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        None => url.to_string(),
    }
}
