//! Transactions and savepoints.
//!
//! Transactions are flat: [`Connection::begin`] fails while one is open.
//! Nesting is explicit through [`Connection::savepoint`], which returns a
//! handle that knows its parent. Finishing a handle twice is a no-op that
//! reports `false`. A handle dropped while open is rolled back before the
//! connection runs its next statement.

use tracing::{debug, warn};

use crate::connection::{run_raw, Connection, Deferred};
use crate::error::{QueryError, Result};

const ROOT_KEY: &str = "root";

/// Where a connection stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction is open.
    None,
    /// A transaction is open with no savepoints.
    Root,
    /// The innermost open scope is a savepoint.
    Savepoint {
        /// Key of the enclosing transaction or savepoint.
        parent: String,
    },
}

/// An open transaction or savepoint.
#[must_use = "a transaction is rolled back when its handle is dropped"]
#[derive(Debug)]
pub struct Transaction<'c> {
    conn: &'c Connection,
    key: String,
    parent: Option<String>,
    closed: bool,
}

impl Transaction<'_> {
    /// Transaction key (`root`, or the savepoint name).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key of the enclosing scope, for savepoints.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether this handle is a savepoint.
    #[must_use]
    pub const fn is_savepoint(&self) -> bool {
        self.parent.is_some()
    }

    /// Whether commit or rollback has already run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Commits. Committing a savepoint releases it and leaves the parent
    /// open.
    ///
    /// Returns `false` when the handle was already closed or its scope was
    /// ended by an enclosing handle.
    pub async fn commit(&mut self) -> Result<bool> {
        self.finish(false).await
    }

    /// Rolls back. Rolling back a savepoint undoes only the work done
    /// since it was taken.
    pub async fn rollback(&mut self) -> Result<bool> {
        self.finish(true).await
    }

    async fn finish(&mut self, rollback: bool) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let mut state = self.conn.lock_state().await;
        let Some(position) = state.transactions.iter().position(|k| *k == self.key) else {
            self.closed = true;
            return Ok(false);
        };
        // a failed statement leaves the scope open for a retry
        for sql in finish_statements(&self.key, self.is_savepoint(), rollback) {
            run_raw(&mut state.conn, &sql).await?;
        }
        // inner savepoints end with their parent
        state.transactions.truncate(position);
        self.closed = true;
        debug!(key = %self.key, rollback, "Transaction finished");
        Ok(true)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(key = %self.key, "Transaction handle dropped while open, rolling back");
            self.conn.defer(Deferred::Rollback {
                key: self.key.clone(),
                savepoint: self.is_savepoint(),
            });
        }
    }
}

pub(crate) fn finish_statements(key: &str, savepoint: bool, rollback: bool) -> Vec<String> {
    match (savepoint, rollback) {
        (false, false) => vec![String::from("COMMIT")],
        (false, true) => vec![String::from("ROLLBACK")],
        (true, false) => vec![format!("RELEASE SAVEPOINT {key}")],
        (true, true) => vec![
            format!("ROLLBACK TO SAVEPOINT {key}"),
            format!("RELEASE SAVEPOINT {key}"),
        ],
    }
}

impl Connection {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// A [`QueryErrorKind::Transaction`](crate::error::QueryErrorKind)
    /// error when one is already open.
    pub async fn begin(&self) -> Result<Transaction<'_>> {
        let mut state = self.lock_state().await;
        if !state.transactions.is_empty() {
            return Err(QueryError::transaction("a transaction is already open", "BEGIN").into());
        }
        run_raw(&mut state.conn, "BEGIN").await?;
        state.transactions.push(ROOT_KEY.to_string());
        Ok(Transaction {
            conn: self,
            key: ROOT_KEY.to_string(),
            parent: None,
            closed: false,
        })
    }

    /// Takes a savepoint inside the open transaction.
    ///
    /// # Errors
    ///
    /// A transaction error when no transaction is open.
    pub async fn savepoint(&self) -> Result<Transaction<'_>> {
        let mut state = self.lock_state().await;
        let Some(parent) = state.transactions.last().cloned() else {
            return Err(QueryError::transaction("no transaction is open", "SAVEPOINT").into());
        };
        state.savepoint_seq += 1;
        let key = format!("sp_{}", state.savepoint_seq);
        run_raw(&mut state.conn, &format!("SAVEPOINT {key}")).await?;
        state.transactions.push(key.clone());
        Ok(Transaction {
            conn: self,
            key,
            parent: Some(parent),
            closed: false,
        })
    }

    /// The current transaction state.
    pub async fn transaction_state(&self) -> TransactionState {
        let state = self.lock_state().await;
        match state.transactions.as_slice() {
            [] => TransactionState::None,
            [_] => TransactionState::Root,
            [.., parent, _] => TransactionState::Savepoint {
                parent: parent.clone(),
            },
        }
    }
}
