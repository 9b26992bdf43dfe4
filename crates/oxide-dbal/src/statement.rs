//! Prepared statements and cursors.
//!
//! A [`Statement`] is immutable and can be executed any number of times.
//! Executing it for rows produces a [`Cursor`], which is consumed once.

use oxide_dbal_core::result::{QueryResult, ResultSet, ReturnType, Row};
use oxide_dbal_core::SqlValue;
use sqlx::{Column, Executor, Statement as _};

use crate::connection::Connection;
use crate::error::{QueryError, Result};

/// A statement validated by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    columns: Vec<String>,
}

impl Statement {
    /// Statement text with `?` placeholders.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Result columns as reported at preparation. Empty for writes, and
    /// for engines that only describe columns after execution.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Executes with `params` and shapes the result.
    pub async fn execute(
        &self,
        conn: &Connection,
        params: &[SqlValue],
        return_type: ReturnType,
    ) -> Result<QueryResult> {
        conn.query(&self.sql, params, return_type).await
    }

    /// Executes with `params` and opens a cursor over the rows.
    pub async fn cursor(&self, conn: &Connection, params: &[SqlValue]) -> Result<Cursor> {
        Ok(Cursor::new(conn.fetch_set(&self.sql, params).await?))
    }
}

impl Connection {
    /// Prepares `sql` on the server, failing early on syntax errors or
    /// unknown tables.
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        let native = self.dialect().native_placeholders(sql);
        let mut state = self.lock_state().await;
        let prepared = (&mut state.conn)
            .prepare(&native)
            .await
            .map_err(|e| QueryError::from_sqlx(&e, sql, &[]))?;
        let columns = prepared
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        Ok(Statement {
            sql: sql.to_string(),
            columns,
        })
    }

    /// Runs `sql` and opens a cursor over the rows.
    pub async fn cursor(&self, sql: &str, params: &[SqlValue]) -> Result<Cursor> {
        Ok(Cursor::new(self.fetch_set(sql, params).await?))
    }
}

/// Rows produced by one execution, yielded keyed by column.
///
/// Rows are read in full before the cursor is handed out.
#[derive(Debug)]
pub struct Cursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl Cursor {
    /// Wraps a result set.
    #[must_use]
    pub fn new(result: ResultSet) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows.into_iter(),
        }
    }

    /// Column names in select order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Next row, positional.
    pub fn next_positional(&mut self) -> Option<Vec<SqlValue>> {
        self.rows.next()
    }
}

impl Iterator for Cursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let row = self.rows.next()?;
        Some(self.columns.iter().cloned().zip(row).collect())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}
