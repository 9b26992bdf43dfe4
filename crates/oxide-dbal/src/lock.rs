//! Advisory locks.
//!
//! MySQL waits natively with `GET_LOCK`. Postgres polls
//! `pg_try_advisory_lock` on a hash of the name. SQLite has no lock
//! primitive, so a row in a bookkeeping table stands in for the lock.
//!
//! A lock held by [`Connection::with_lock`] is released even when the
//! future is dropped half way; the release then runs before the
//! connection's next statement.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use oxide_dbal_core::dialect::DialectKind;
use oxide_dbal_core::result::{QueryResult, ReturnType};
use oxide_dbal_core::SqlValue;
use tracing::{debug, info, warn};

use crate::connection::{Connection, Deferred};
use crate::error::{DbalError, Result};

/// Table holding SQLite lock rows.
pub const SQLITE_LOCK_TABLE: &str = "_oxide_locks";

/// Statement releasing a lock by its physical name.
pub(crate) fn release_sql(kind: DialectKind) -> String {
    match kind {
        DialectKind::MySql => String::from("SELECT RELEASE_LOCK(?)"),
        DialectKind::Postgres => String::from("SELECT pg_advisory_unlock(hashtext(?))"),
        DialectKind::Sqlite => format!("DELETE FROM {SQLITE_LOCK_TABLE} WHERE name = ?"),
    }
}

/// A lock taken by [`Connection::with_lock`]. Dropping it unreleased
/// queues the release on the connection.
struct LockGuard<'c> {
    conn: &'c Connection,
    name: String,
    armed: bool,
}

impl LockGuard<'_> {
    async fn release(mut self) {
        match self.conn.delete_lock(&self.name).await {
            Ok(_) => self.armed = false,
            Err(err) => {
                warn!(lock = %self.name, error = %err, "Failed to release lock, retrying later");
            }
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(lock = %self.name, "Lock holder dropped, release deferred");
            self.conn
                .defer(Deferred::ReleaseLock(self.conn.ctx().physical(&self.name)));
        }
    }
}

impl Connection {
    /// Acquires the advisory lock `name`, waiting up to `timeout`.
    ///
    /// Returns `false` if the lock is still held elsewhere when the timeout
    /// expires.
    pub async fn create_lock(&self, name: &str, timeout: Duration) -> Result<bool> {
        let name = self.ctx().physical(name);
        let acquired = match self.kind() {
            DialectKind::MySql => {
                let seconds = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
                let result = self
                    .query(
                        "SELECT GET_LOCK(?, ?)",
                        &[SqlValue::Text(name.clone()), SqlValue::Int(seconds)],
                        ReturnType::ValOrNull,
                    )
                    .await?;
                matches!(result, QueryResult::Value(Some(v)) if v.as_i64() == Some(1))
            }
            DialectKind::Postgres => {
                let name = name.as_str();
                self.poll_lock(timeout, move || async move {
                    let result = self
                        .query(
                            "SELECT pg_try_advisory_lock(hashtext(?))",
                            &[SqlValue::Text(name.to_string())],
                            ReturnType::Val,
                        )
                        .await?;
                    Ok(matches!(result, QueryResult::Value(Some(v)) if v.as_bool() == Some(true)))
                })
                .await?
            }
            DialectKind::Sqlite => {
                self.execute_raw(&format!(
                    "CREATE TABLE IF NOT EXISTS {SQLITE_LOCK_TABLE} (name TEXT PRIMARY KEY, acquired_at TEXT NOT NULL)"
                ))
                .await?;
                let sql = format!(
                    "INSERT OR IGNORE INTO {SQLITE_LOCK_TABLE} (name, acquired_at) VALUES (?, datetime('now'))"
                );
                let (sql, name) = (sql.as_str(), name.as_str());
                self.poll_lock(timeout, move || async move {
                    let (inserted, _) = self
                        .execute_params(sql, &[SqlValue::Text(name.to_string())])
                        .await?;
                    Ok(inserted == 1)
                })
                .await?
            }
        };
        if acquired {
            info!(lock = %name, "Lock acquired");
        } else {
            warn!(lock = %name, ?timeout, "Lock not acquired");
        }
        Ok(acquired)
    }

    /// Releases the advisory lock `name`. Returns `false` if it was not
    /// held.
    pub async fn delete_lock(&self, name: &str) -> Result<bool> {
        let name = self.ctx().physical(name);
        let released = match self.kind() {
            DialectKind::MySql => {
                let result = self
                    .query(
                        &release_sql(DialectKind::MySql),
                        &[SqlValue::Text(name.clone())],
                        ReturnType::ValOrNull,
                    )
                    .await?;
                matches!(result, QueryResult::Value(Some(v)) if v.as_i64() == Some(1))
            }
            DialectKind::Postgres => {
                let result = self
                    .query(
                        &release_sql(DialectKind::Postgres),
                        &[SqlValue::Text(name.clone())],
                        ReturnType::Val,
                    )
                    .await?;
                matches!(result, QueryResult::Value(Some(v)) if v.as_bool() == Some(true))
            }
            DialectKind::Sqlite => {
                let sql = release_sql(DialectKind::Sqlite);
                let (deleted, _) = self
                    .execute_params(&sql, &[SqlValue::Text(name.clone())])
                    .await?;
                deleted == 1
            }
        };
        debug!(lock = %name, released, "Lock released");
        Ok(released)
    }

    /// Runs `f` while holding the lock `name`.
    ///
    /// The lock is released whether `f` succeeds, fails or panics; a panic
    /// is resumed after the release. If this future is dropped while `f`
    /// runs, the release is deferred to the connection's next statement.
    ///
    /// # Errors
    ///
    /// [`DbalError::Lock`] when the lock is not acquired within `timeout`,
    /// otherwise whatever `f` returns.
    pub async fn with_lock<F, Fut, T>(&self, name: &str, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.create_lock(name, timeout).await? {
            return Err(DbalError::Lock {
                name: name.to_string(),
                timeout,
            });
        }
        let guard = LockGuard {
            conn: self,
            name: name.to_string(),
            armed: true,
        };
        let outcome = AssertUnwindSafe(f()).catch_unwind().await;
        guard.release().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn poll_lock<F, Fut>(&self, timeout: Duration, mut attempt: F) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if attempt().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.config().lock_poll_interval).await;
        }
    }
}
