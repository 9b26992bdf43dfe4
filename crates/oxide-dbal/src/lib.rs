//! # oxide-dbal
//!
//! Runs what `oxide-dbal-core` renders, over a single `sqlx` connection to
//! MySQL, PostgreSQL or SQLite.
//!
//! - [`Connection`]: parameterized queries shaped by a
//!   [`ReturnType`](oxide_dbal_core::result::ReturnType), writes, quoting
//!   and an optional result cache
//! - [`Statement`] and [`Cursor`]: prepared statements and one-shot row
//!   iteration
//! - [`Transaction`]: flat transactions plus explicit savepoints
//! - Advisory locks with guaranteed release ([`Connection::with_lock`])
//! - Catalog introspection that rebuilds the schema model from a live
//!   database
//! - [`Synchronizer`]: plans and applies schema changes with a log
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxide_dbal::{Connection, ConnectionConfig, Synchronizer};
//! use oxide_dbal_core::schema::parse_str;
//!
//! # async fn run() -> oxide_dbal::Result<()> {
//! let conn = Connection::connect(ConnectionConfig::new("sqlite::memory:")).await?;
//! let declared = parse_str(
//!     r#"<database>
//!          <table name="clubs">
//!            <column name="id" type="INT UNSIGNED" autoinc="true"/>
//!            <column name="name" type="VARCHAR(200)"/>
//!            <primary><col name="id"/></primary>
//!          </table>
//!        </database>"#,
//! )?;
//! let report = Synchronizer::new(&conn).migrate(&declared, true).await?;
//! print!("{}", report.log);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod fetch;
mod introspect;
pub mod lock;
pub mod statement;
pub mod sync;
pub mod transaction;

pub use connection::{Connection, ConnectionConfig};
pub use error::{DbalError, QueryError, QueryErrorKind, Result};
pub use fetch::Fetch;
pub use statement::{Cursor, Statement};
pub use sync::{SyncReport, Synchronizer};
pub use transaction::{Transaction, TransactionState};
