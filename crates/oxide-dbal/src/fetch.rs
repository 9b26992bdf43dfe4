//! Terminal operations for SELECT builders.
//!
//! [`Fetch`] renders a [`Query`] against a connection's dialect and prefix,
//! runs it and returns the shape the method names.
//!
//! ```rust,no_run
//! use oxide_dbal::fetch::Fetch;
//! use oxide_dbal::Connection;
//! use oxide_dbal_core::condition::col;
//! use oxide_dbal_core::query::Query;
//!
//! # async fn run(conn: &Connection) -> oxide_dbal::Result<()> {
//! let names = Query::from("clubs")
//!     .select(["name"])
//!     .where_(col("city").eq("Eindhoven"))
//!     .column(conn)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use indexmap::IndexMap;
use oxide_dbal_core::error::ArgumentError;
use oxide_dbal_core::query::Query;
use oxide_dbal_core::result::{QueryResult, ReturnType, Row};
use oxide_dbal_core::SqlValue;
use serde::de::DeserializeOwned;

use crate::connection::Connection;
use crate::error::{DbalError, Result};
use crate::statement::Cursor;

fn unexpected(result: &QueryResult) -> DbalError {
    DbalError::InvalidArgument(ArgumentError::Other(format!(
        "unexpected result shape: {result:?}"
    )))
}

/// Runs a SELECT builder.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    /// Runs with an explicit return type.
    async fn fetch(&self, conn: &Connection, return_type: ReturnType) -> Result<QueryResult>;

    /// All rows.
    async fn all(&self, conn: &Connection) -> Result<Vec<Row>> {
        match self.fetch(conn, ReturnType::Arr).await? {
            QueryResult::Rows(rows) => Ok(rows),
            other => Err(unexpected(&other)),
        }
    }

    /// All rows, deserialized into `T` by column name.
    async fn all_as<T: DeserializeOwned>(&self, conn: &Connection) -> Result<Vec<T>> {
        self.all(conn)
            .await?
            .into_iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> =
                    row.into_iter().map(|(k, v)| (k, v.to_json())).collect();
                serde_json::from_value(serde_json::Value::Object(object)).map_err(DbalError::from)
            })
            .collect()
    }

    /// The first row.
    ///
    /// # Errors
    ///
    /// [`DbalError::RowMissing`] when nothing matches.
    async fn one(&self, conn: &Connection) -> Result<Row> {
        self.one_or_none(conn).await?.ok_or(DbalError::RowMissing)
    }

    /// The first row, if any.
    async fn one_or_none(&self, conn: &Connection) -> Result<Option<Row>> {
        match self.fetch(conn, ReturnType::RowOrNull).await? {
            QueryResult::Row(row) => Ok(row),
            other => Err(unexpected(&other)),
        }
    }

    /// First column of the first row.
    async fn value(&self, conn: &Connection) -> Result<SqlValue> {
        match self.fetch(conn, ReturnType::Val).await? {
            QueryResult::Value(Some(value)) => Ok(value),
            QueryResult::Value(None) => Err(DbalError::RowMissing),
            other => Err(unexpected(&other)),
        }
    }

    /// First column to second column.
    async fn map(&self, conn: &Connection) -> Result<IndexMap<String, SqlValue>> {
        match self.fetch(conn, ReturnType::Map).await? {
            QueryResult::Map(map) => Ok(map),
            other => Err(unexpected(&other)),
        }
    }

    /// Rows keyed by their first column.
    async fn keyed(&self, conn: &Connection) -> Result<IndexMap<String, Row>> {
        match self.fetch(conn, ReturnType::MapArr).await? {
            QueryResult::MapArr(map) => Ok(map),
            other => Err(unexpected(&other)),
        }
    }

    /// First column of every row.
    async fn column(&self, conn: &Connection) -> Result<Vec<SqlValue>> {
        match self.fetch(conn, ReturnType::Col).await? {
            QueryResult::Column(values) => Ok(values),
            other => Err(unexpected(&other)),
        }
    }

    /// Number of matching rows, ignoring order and paging.
    async fn count(&self, conn: &Connection) -> Result<i64>;

    /// Opens a cursor over the rows.
    async fn cursor(&self, conn: &Connection) -> Result<Cursor>;
}

impl Fetch for Query {
    async fn fetch(&self, conn: &Connection, return_type: ReturnType) -> Result<QueryResult> {
        let (sql, params) = self.build(&conn.ctx())?;
        conn.query(&sql, &params, return_type).await
    }

    async fn one_or_none(&self, conn: &Connection) -> Result<Option<Row>> {
        match self.clone().limit(1).fetch(conn, ReturnType::RowOrNull).await? {
            QueryResult::Row(row) => Ok(row),
            other => Err(unexpected(&other)),
        }
    }

    async fn count(&self, conn: &Connection) -> Result<i64> {
        let value = self.count_query().value(conn).await?;
        value
            .as_i64()
            .ok_or_else(|| unexpected(&QueryResult::Value(Some(value))))
    }

    async fn cursor(&self, conn: &Connection) -> Result<Cursor> {
        let (sql, params) = self.build(&conn.ctx())?;
        conn.cursor(&sql, &params).await
    }
}
