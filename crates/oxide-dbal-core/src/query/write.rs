//! INSERT, UPDATE and DELETE builders.
//!
//! Like [`Query`](super::Query), these borrow themselves when building and
//! validate every identifier first. UPDATE and DELETE refuse to run
//! without a condition unless [`all_rows`](Delete::all_rows) was called.

use indexmap::IndexMap;

use crate::condition::Condition;
use crate::dialect::{is_identifier, SqlContext};
use crate::error::{ArgumentError, BuildError};
use crate::value::{SqlValue, ToSqlValue};

fn checked_table(ctx: &SqlContext<'_>, table: &str) -> Result<String, ArgumentError> {
    if is_identifier(table) {
        Ok(ctx.table(table))
    } else {
        Err(ArgumentError::Identifier(table.to_string()))
    }
}

fn checked_column(ctx: &SqlContext<'_>, column: &str) -> Result<String, ArgumentError> {
    if is_identifier(column) {
        Ok(ctx.ident(column))
    } else {
        Err(ArgumentError::Identifier(column.to_string()))
    }
}

fn render_condition(
    ctx: &SqlContext<'_>,
    condition: Option<&Condition>,
    all_rows: bool,
    params: &mut Vec<SqlValue>,
) -> Result<String, BuildError> {
    let sql = match condition {
        Some(condition) => condition.write(ctx, params)?,
        None => String::new(),
    };
    if sql.is_empty() {
        if all_rows {
            return Ok(String::new());
        }
        return Err(ArgumentError::Other(String::from(
            "refusing to touch every row without a condition (use all_rows)",
        ))
        .into());
    }
    Ok(format!(" WHERE {sql}"))
}

/// A single-row INSERT.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Insert {
    table: String,
    values: IndexMap<String, SqlValue>,
}

impl Insert {
    /// Creates an INSERT into `table`.
    #[must_use]
    pub fn into(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: IndexMap::new(),
        }
    }

    /// Sets one column value.
    #[must_use]
    pub fn value<T: ToSqlValue>(mut self, column: &str, value: T) -> Self {
        self.values.insert(column.to_string(), value.to_sql_value());
        self
    }

    /// Sets several column values.
    #[must_use]
    pub fn values<I, K, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: ToSqlValue,
    {
        self.values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.to_sql_value())));
        self
    }

    fn head(&self, ctx: &SqlContext<'_>) -> Result<String, BuildError> {
        if self.values.is_empty() {
            return Err(ArgumentError::Other(format!(
                "nothing to insert into '{}'",
                self.table
            ))
            .into());
        }
        let columns = self
            .values
            .keys()
            .map(|c| checked_column(ctx, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!(
            "INSERT INTO {} ({})",
            checked_table(ctx, &self.table)?,
            columns.join(", ")
        ))
    }

    /// Renders with placeholders.
    pub fn build(&self, ctx: &SqlContext<'_>) -> Result<(String, Vec<SqlValue>), BuildError> {
        let head = self.head(ctx)?;
        let placeholders = vec!["?"; self.values.len()].join(", ");
        Ok((
            format!("{head} VALUES ({placeholders})"),
            self.values.values().cloned().collect(),
        ))
    }

    /// Renders with values quoted inline, for DDL scripts where
    /// placeholders are unavailable.
    pub fn build_inline(&self, ctx: &SqlContext<'_>) -> Result<String, BuildError> {
        let head = self.head(ctx)?;
        let values: Vec<String> = self.values.values().map(|v| ctx.value(v)).collect();
        Ok(format!("{head} VALUES ({})", values.join(", ")))
    }
}

/// An UPDATE.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    table: String,
    values: IndexMap<String, SqlValue>,
    condition: Option<Condition>,
    all_rows: bool,
}

impl Update {
    /// Creates an UPDATE of `table`.
    #[must_use]
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Sets one column value.
    #[must_use]
    pub fn set<T: ToSqlValue>(mut self, column: &str, value: T) -> Self {
        self.values.insert(column.to_string(), value.to_sql_value());
        self
    }

    /// Sets several column values.
    #[must_use]
    pub fn values<I, K, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: ToSqlValue,
    {
        self.values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.to_sql_value())));
        self
    }

    /// Sets the condition.
    #[must_use]
    pub fn where_(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Allows updating every row.
    #[must_use]
    pub const fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    /// Renders with placeholders.
    pub fn build(&self, ctx: &SqlContext<'_>) -> Result<(String, Vec<SqlValue>), BuildError> {
        if self.values.is_empty() {
            return Err(ArgumentError::Other(format!(
                "nothing to update in '{}'",
                self.table
            ))
            .into());
        }
        let table = checked_table(ctx, &self.table)?;
        let mut params = Vec::with_capacity(self.values.len());
        let assignments = self
            .values
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                Ok(format!("{} = ?", checked_column(ctx, column)?))
            })
            .collect::<Result<Vec<_>, ArgumentError>>()?;
        let filter = render_condition(ctx, self.condition.as_ref(), self.all_rows, &mut params)?;
        Ok((
            format!("UPDATE {table} SET {}{filter}", assignments.join(", ")),
            params,
        ))
    }
}

/// A DELETE.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Delete {
    table: String,
    condition: Option<Condition>,
    all_rows: bool,
}

impl Delete {
    /// Creates a DELETE from `table`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Sets the condition.
    #[must_use]
    pub fn where_(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Allows deleting every row.
    #[must_use]
    pub const fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    /// Renders with placeholders.
    pub fn build(&self, ctx: &SqlContext<'_>) -> Result<(String, Vec<SqlValue>), BuildError> {
        let table = checked_table(ctx, &self.table)?;
        let mut params = Vec::new();
        let filter = render_condition(ctx, self.condition.as_ref(), self.all_rows, &mut params)?;
        Ok((format!("DELETE FROM {table}{filter}"), params))
    }
}
