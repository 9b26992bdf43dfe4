//! Connection handle.
//!
//! A [`Connection`] owns exactly one `sqlx` [`AnyConnection`]; there is no
//! pool. Every call locks the handle for the duration of one statement, so
//! callers awaiting in sequence see blocking semantics.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use oxide_dbal_core::cache::{cache_key, Cache};
use oxide_dbal_core::condition::{BindMode, Condition};
use oxide_dbal_core::dialect::{is_field, Dialect, DialectKind, SqlContext};
use oxide_dbal_core::error::ArgumentError;
use oxide_dbal_core::query::{Delete, Insert, Update};
use oxide_dbal_core::result::{QueryResult, ResultSet, ReturnType};
use oxide_dbal_core::SqlValue;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::AnyConnection;
use sqlx::query::Query as SqlxQuery;
use sqlx::{Any, Column, Connection as _, Row};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{DbalError, QueryError, Result};
use crate::{lock, transaction};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Driver URL (`sqlite::memory:`, `mysql://...`, `postgres://...`).
    pub url: String,
    /// Prefix applied to every physical table name.
    pub table_prefix: String,
    /// Sleep between attempts while polling for an advisory lock.
    pub lock_poll_interval: Duration,
    /// Lifetime of cached results; `None` keeps them until cleared.
    pub cache_ttl: Option<Duration>,
}

impl ConnectionConfig {
    /// Creates settings for `url` with no prefix.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            table_prefix: String::new(),
            lock_poll_interval: Duration::from_millis(100),
            cache_ttl: None,
        }
    }

    /// Reads the URL from `DATABASE_URL`.
    pub fn from_env() -> Result<Self> {
        std::env::var("DATABASE_URL").map(Self::new).map_err(|_| {
            DbalError::InvalidArgument(ArgumentError::Other(String::from(
                "DATABASE_URL is not set",
            )))
        })
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets the lock polling interval.
    #[must_use]
    pub const fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

pub(crate) struct State {
    pub(crate) conn: AnyConnection,
    /// Keys of the open transaction and its savepoints, outermost first.
    pub(crate) transactions: Vec<String>,
    pub(crate) savepoint_seq: u64,
}

/// Cleanup left behind by a handle dropped before it finished. It runs
/// the next time the driver connection is locked.
#[derive(Debug, Clone)]
pub(crate) enum Deferred {
    /// Roll back the transaction or savepoint `key`.
    Rollback { key: String, savepoint: bool },
    /// Release the advisory lock with this physical name.
    ReleaseLock(String),
}

/// A single database connection plus the dialect and prefix used to
/// render statements for it.
pub struct Connection {
    pub(crate) state: Mutex<State>,
    deferred: parking_lot::Mutex<VecDeque<Deferred>>,
    kind: DialectKind,
    config: ConnectionConfig,
    cache: Option<Arc<dyn Cache>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("table_prefix", &self.config.table_prefix)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a connection.
    ///
    /// # Errors
    ///
    /// [`DbalError::Connection`] when the database is unreachable or
    /// rejects the credentials; [`DbalError::InvalidArgument`] for an
    /// unsupported backend.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let conn = AnyConnection::connect(&config.url)
            .await
            .map_err(|e| DbalError::connection(&config.url, &e))?;
        let kind = DialectKind::from_backend_name(conn.backend_name())?;
        info!(backend = conn.backend_name(), "Connected");
        Ok(Self {
            state: Mutex::new(State {
                conn,
                transactions: Vec::new(),
                savepoint_seq: 0,
            }),
            deferred: parking_lot::Mutex::new(VecDeque::new()),
            kind,
            config,
            cache: None,
        })
    }

    /// Opens a connection to `url` with default settings.
    pub async fn open(url: &str) -> Result<Self> {
        Self::connect(ConnectionConfig::new(url)).await
    }

    /// Attaches a result cache consulted by row-reading return types.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Closes the connection.
    pub async fn close(self) -> Result<()> {
        drop(self.lock_state().await);
        let state = self.state.into_inner();
        state
            .conn
            .close()
            .await
            .map_err(|e| QueryError::from_sqlx(&e, "", &[]).into())
    }

    /// The engine.
    #[must_use]
    pub const fn kind(&self) -> DialectKind {
        self.kind
    }

    /// The dialect.
    #[must_use]
    pub fn dialect(&self) -> &'static dyn Dialect {
        self.kind.dialect()
    }

    /// The table prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.config.table_prefix
    }

    /// The settings this connection was opened with.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Rendering context for builders.
    #[must_use]
    pub fn ctx(&self) -> SqlContext<'_> {
        SqlContext::new(self.dialect(), &self.config.table_prefix)
    }

    /// Direct access to the underlying driver connection.
    pub async fn raw_connection(&self) -> MappedMutexGuard<'_, AnyConnection> {
        MutexGuard::map(self.lock_state().await, |state| &mut state.conn)
    }

    /// Quotes `value` for inline use. [`BindMode::Field`] quotes a text
    /// value as a field reference; the other modes quote a literal.
    pub fn quote(&self, value: &SqlValue, mode: BindMode) -> Result<String> {
        match mode {
            BindMode::Field => match value.as_str() {
                Some(name) => self.quote_field(name),
                None => Err(ArgumentError::Identifier(value.to_string()).into()),
            },
            BindMode::Natural | BindMode::Value => Ok(self.dialect().quote_value(value)),
        }
    }

    /// Quotes a possibly qualified field reference.
    pub fn quote_field(&self, name: &str) -> Result<String> {
        if !is_field(name, true) {
            return Err(ArgumentError::Identifier(name.to_string()).into());
        }
        Ok(self.dialect().quote_field(name))
    }

    /// Runs `sql` and shapes the result as `return_type`.
    ///
    /// Row-reading shapes are served from and stored into the attached
    /// cache, if any.
    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        return_type: ReturnType,
    ) -> Result<QueryResult> {
        let key = match &self.cache {
            Some(_) if return_type.reads_rows() => Some(cache_key(sql, params, return_type)),
            _ => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                debug!(return_type = %return_type, "Cache hit");
                return Ok(hit);
            }
        }

        let set = match return_type {
            ReturnType::Null | ReturnType::Count => {
                let (affected, _) = self.execute_params(sql, params).await?;
                ResultSet::affected(affected)
            }
            _ => self.fetch_set(sql, params).await?,
        };
        let result = return_type.shape(set)?;

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            cache.store(key, result.clone(), self.config.cache_ttl);
        }
        Ok(result)
    }

    /// Clears one cached result, or all of them.
    pub fn clear_cache(&self, key: Option<&str>) {
        if let Some(cache) = &self.cache {
            cache.clear(key);
        }
    }

    /// Runs a statement without parameters, e.g. DDL, and returns the
    /// affected row count.
    pub async fn execute_raw(&self, sql: &str) -> Result<u64> {
        let mut state = self.lock_state().await;
        run_raw(&mut state.conn, sql).await
    }

    /// Inserts one row and returns the generated id where the engine
    /// reports one.
    pub async fn insert(
        &self,
        table: &str,
        data: &IndexMap<String, SqlValue>,
    ) -> Result<Option<i64>> {
        let insert = Insert::into(table).values(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        let (sql, params) = insert.build(&self.ctx())?;
        let (_, id) = self.execute_params(&sql, &params).await?;
        Ok(id)
    }

    /// Updates the rows matching `condition` and returns how many changed.
    pub async fn update(
        &self,
        table: &str,
        data: &IndexMap<String, SqlValue>,
        condition: Condition,
    ) -> Result<u64> {
        let update = Update::table(table)
            .values(data.iter().map(|(k, v)| (k.clone(), v.clone())))
            .where_(condition);
        let (sql, params) = update.build(&self.ctx())?;
        Ok(self.execute_params(&sql, &params).await?.0)
    }

    /// Deletes the rows matching `condition` and returns how many went.
    pub async fn delete(&self, table: &str, condition: Condition) -> Result<u64> {
        let (sql, params) = Delete::from(table).where_(condition).build(&self.ctx())?;
        Ok(self.execute_params(&sql, &params).await?.0)
    }

    pub(crate) async fn fetch_set(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let native = self.dialect().native_placeholders(sql);
        debug!(sql = %native, params = params.len(), "Executing query");
        let mut state = self.lock_state().await;
        let rows = bind_all(sqlx::query(&native), params)
            .fetch_all(&mut state.conn)
            .await
            .map_err(|e| QueryError::from_sqlx(&e, sql, params))?;
        Ok(result_set(&rows))
    }

    /// Runs a write and returns the affected row count and last insert id.
    pub(crate) async fn execute_params(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<(u64, Option<i64>)> {
        let native = self.dialect().native_placeholders(sql);
        debug!(sql = %native, params = params.len(), "Executing statement");
        let mut state = self.lock_state().await;
        run_params(&mut state.conn, &native, sql, params).await
    }

    /// Queues cleanup for the next time the connection is used.
    pub(crate) fn defer(&self, cleanup: Deferred) {
        debug!(?cleanup, "Cleanup deferred");
        self.deferred.lock().push_back(cleanup);
    }

    /// Locks the driver connection, first running any deferred cleanup.
    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().await;
        loop {
            let next = self.deferred.lock().front().cloned();
            let Some(cleanup) = next else {
                break;
            };
            self.run_deferred(&mut state, &cleanup).await;
            self.deferred.lock().pop_front();
        }
        state
    }

    async fn run_deferred(&self, state: &mut State, cleanup: &Deferred) {
        match cleanup {
            Deferred::Rollback { key, savepoint } => {
                let Some(position) = state.transactions.iter().position(|k| k == key) else {
                    return;
                };
                for sql in transaction::finish_statements(key, *savepoint, true) {
                    if let Err(err) = run_raw(&mut state.conn, &sql).await {
                        warn!(key = %key, error = %err, "Rollback of dropped transaction failed");
                        break;
                    }
                }
                // nobody holds the handle, so the scope ends either way
                state.transactions.truncate(position);
                info!(key = %key, "Rolled back dropped transaction");
            }
            Deferred::ReleaseLock(name) => {
                let sql = lock::release_sql(self.kind);
                let native = self.dialect().native_placeholders(&sql);
                let params = [SqlValue::Text(name.clone())];
                match run_params(&mut state.conn, &native, &sql, &params).await {
                    Ok(_) => info!(lock = %name, "Released lock of dropped holder"),
                    Err(err) => warn!(lock = %name, error = %err, "Failed to release lock"),
                }
            }
        }
    }
}

async fn run_params(
    conn: &mut AnyConnection,
    native: &str,
    sql: &str,
    params: &[SqlValue],
) -> Result<(u64, Option<i64>)> {
    let done = bind_all(sqlx::query(native), params)
        .execute(&mut *conn)
        .await
        .map_err(|e| QueryError::from_sqlx(&e, sql, params))?;
    Ok((done.rows_affected(), done.last_insert_id()))
}

pub(crate) async fn run_raw(conn: &mut AnyConnection, sql: &str) -> Result<u64> {
    debug!(sql, "Executing raw statement");
    let done = sqlx::raw_sql(sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| QueryError::from_sqlx(&e, sql, &[]))?;
    Ok(done.rows_affected())
}

/// Binds a SqlValue parameter to a query.
fn bind_value<'q>(
    query: SqlxQuery<'q, Any, AnyArguments<'q>>,
    value: SqlValue,
) -> SqlxQuery<'q, Any, AnyArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Float(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
    }
}

fn bind_all<'q>(
    query: SqlxQuery<'q, Any, AnyArguments<'q>>,
    params: &[SqlValue],
) -> SqlxQuery<'q, Any, AnyArguments<'q>> {
    params.iter().cloned().fold(query, bind_value)
}

fn result_set(rows: &[AnyRow]) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode(row, i)).collect())
        .collect();
    ResultSet::new(columns, rows)
}

/// Decodes one column, trying the wide types first.
fn decode(row: &AnyRow, index: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(SqlValue::Null, SqlValue::Int);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return SqlValue::Float(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return SqlValue::Text(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        // catalog columns of some MySQL versions arrive as binary strings
        return match String::from_utf8(v) {
            Ok(s) => SqlValue::Text(s),
            Err(e) => SqlValue::Blob(e.into_bytes()),
        };
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return SqlValue::Bool(v);
    }
    SqlValue::Null
}
