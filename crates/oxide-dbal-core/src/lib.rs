//! # oxide-dbal-core
//!
//! The driver-free half of the database access layer.
//!
//! This crate provides:
//! - A condition model that composes nested boolean filters into
//!   parameterized SQL
//! - A SELECT builder plus INSERT, UPDATE and DELETE builders
//! - A schema model loaded from XML documents, with a sanity check
//! - A sync planner that diffs a declared schema against a live one and
//!   emits dependency-ordered DDL
//! - Return-type shaping of result sets and a result cache contract
//!
//! Nothing here opens a connection; the `oxide-dbal` crate executes what
//! this crate renders.
//!
//! ## Building Queries
//!
//! ```rust
//! use oxide_dbal_core::condition::col;
//! use oxide_dbal_core::dialect::{PostgresDialect, SqlContext};
//! use oxide_dbal_core::query::Query;
//! use oxide_dbal_core::SqlValue;
//!
//! let ctx = SqlContext::new(&PostgresDialect, "app_");
//! let (sql, params) = Query::from("users")
//!     .select(["users.id", "users.name"])
//!     .where_(col("users.name").eq("'; DROP TABLE users; --"))
//!     .build(&ctx)
//!     .unwrap();
//!
//! assert_eq!(
//!     sql,
//!     r#"SELECT "users"."id", "users"."name" FROM "app_users" AS "users" WHERE "users"."name" = ?"#
//! );
//! assert_eq!(params, vec![SqlValue::Text(String::from("'; DROP TABLE users; --"))]);
//! ```
//!
//! ## Planning a Sync
//!
//! ```rust
//! use oxide_dbal_core::dialect::{MySqlDialect, SqlContext};
//! use oxide_dbal_core::schema::{Column, Schema, Table};
//! use oxide_dbal_core::sync::{plan, SyncActions};
//!
//! let declared = Schema::new("app").table(
//!     Table::new("clubs")
//!         .column(Column::new("id", "INT UNSIGNED").auto_increment())
//!         .primary_key(["id"]),
//! );
//! let ctx = SqlContext::new(&MySqlDialect, "");
//! let plan = plan(&ctx, &declared, &Schema::new("live"), &SyncActions::default()).unwrap();
//! assert!(plan.sql()[0].starts_with("CREATE TABLE `clubs`"));
//! ```

pub mod cache;
pub mod condition;
pub mod dialect;
pub mod error;
pub mod query;
pub mod result;
pub mod schema;
pub mod sync;
pub mod value;

pub use value::{SqlValue, ToSqlValue};
