//! SQL dialect support.
//!
//! A [`Dialect`] knows how to quote identifiers and literals for one
//! database engine, how to compare column types the way that engine
//! reports them, and how to render the DDL the sync engine emits. The
//! trait's default methods produce ANSI-flavoured DDL; engines override
//! where they differ.

mod mysql;
mod postgres;
mod sqlite;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

pub use mysql::{extract_enum_values, MySqlDialect};
pub use postgres::{rewrite_placeholders, PostgresDialect};
pub use sqlite::SqliteDialect;

use crate::error::ArgumentError;
use crate::schema::{Column, DefaultValue, ForeignKey, Index, IndexType, Table, TableAttributes, View};
use crate::value::SqlValue;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

impl DialectKind {
    /// Picks the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self, ArgumentError> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ArgumentError::Other(format!(
                "unsupported database scheme '{other}'"
            ))),
        }
    }

    /// Picks the dialect from a driver backend name (`MySQL`,
    /// `PostgreSQL`, `SQLite`).
    pub fn from_backend_name(name: &str) -> Result<Self, ArgumentError> {
        match name.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgresql" | "postgres" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ArgumentError::Other(format!("unsupported backend '{other}'"))),
        }
    }

    /// The dialect implementation for this engine.
    #[must_use]
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Self::MySql => &MySqlDialect,
            Self::Postgres => &PostgresDialect,
            Self::Sqlite => &SqliteDialect,
        }
    }
}

impl FromStr for DialectKind {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_backend_name(s)
    }
}

/// Identifier quoting styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `` `name` ``
    Backtick,
    /// `"name"`
    Double,
    /// `[name]`
    Bracket,
}

impl QuoteStyle {
    /// Quotes a single identifier part, doubling embedded closing quotes.
    #[must_use]
    pub fn quote(self, name: &str) -> String {
        match self {
            Self::Backtick => format!("`{}`", name.replace('`', "``")),
            Self::Double => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::Bracket => format!("[{}]", name.replace(']', "]]")),
        }
    }
}

/// Whether `name` is a plain identifier: ASCII letters, digits and
/// underscores.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Whether `name` is an identifier optionally qualified as
/// `table.column`. With `allow_star`, the last part may be `*`.
#[must_use]
pub fn is_field(name: &str, allow_star: bool) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return false;
    }
    parts.iter().enumerate().all(|(i, part)| {
        is_identifier(part) || (allow_star && *part == "*" && i == parts.len() - 1)
    })
}

/// One column attribute that differs between declared and live schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChange {
    /// SQL type.
    Type,
    /// Nullability.
    Null,
    /// Default value.
    Default,
    /// Auto-increment flag.
    AutoIncrement,
}

impl fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Type => "type",
            Self::Null => "null",
            Self::Default => "default",
            Self::AutoIncrement => "autoinc",
        })
    }
}

/// Rendering context: the dialect plus the table prefix applied to every
/// physical table name.
#[derive(Clone, Copy)]
pub struct SqlContext<'a> {
    dialect: &'a dyn Dialect,
    prefix: &'a str,
}

impl fmt::Debug for SqlContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlContext")
            .field("dialect", &self.dialect.name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<'a> SqlContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(dialect: &'a dyn Dialect, prefix: &'a str) -> Self {
        Self { dialect, prefix }
    }

    /// The dialect.
    #[must_use]
    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// The table prefix.
    #[must_use]
    pub const fn prefix(&self) -> &'a str {
        self.prefix
    }

    /// Physical (prefixed) name of a table or other schema object.
    #[must_use]
    pub fn physical(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Quoted physical table name.
    #[must_use]
    pub fn table(&self, name: &str) -> String {
        self.dialect.quote_identifier(&self.physical(name))
    }

    /// Quoted identifier (no prefix).
    #[must_use]
    pub fn ident(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Quoted, possibly qualified, field reference.
    #[must_use]
    pub fn field(&self, name: &str) -> String {
        self.dialect.quote_field(name)
    }

    /// Inline literal.
    #[must_use]
    pub fn value(&self, value: &SqlValue) -> String {
        self.dialect.quote_value(value)
    }

    /// Comma-separated quoted column list.
    #[must_use]
    pub fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Dialect-specific quoting, type comparison and DDL rendering.
pub trait Dialect: Send + Sync {
    /// The engine.
    fn kind(&self) -> DialectKind;

    /// Display name.
    fn name(&self) -> &'static str;

    /// Identifier quoting style.
    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Double
    }

    /// Quotes a single identifier.
    fn quote_identifier(&self, name: &str) -> String {
        self.quote_style().quote(name)
    }

    /// Quotes a possibly qualified field; a trailing `*` stays bare.
    fn quote_field(&self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                if part == "*" {
                    String::from("*")
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quotes a literal for inline use.
    fn quote_value(&self, value: &SqlValue) -> String {
        value.to_sql_inline()
    }

    /// Rewrites `?` placeholders into the engine's native form.
    fn native_placeholders<'s>(&self, sql: &'s str) -> Cow<'s, str> {
        Cow::Borrowed(sql)
    }

    /// Canonical spelling of a column type, used to compare declared and
    /// live types.
    fn normalize_type(&self, sql_type: &str) -> String {
        collapse_whitespace(sql_type).to_ascii_uppercase()
    }

    /// Type as written into DDL.
    fn render_type(&self, column: &Column) -> String {
        column.sql_type.clone()
    }

    /// Whether foreign keys can be added to or dropped from an existing
    /// table.
    fn supports_alter_foreign_key(&self) -> bool {
        true
    }

    /// Whether foreign keys of a new table go inside its CREATE TABLE.
    fn inline_foreign_keys(&self) -> bool {
        false
    }

    /// Whether table attributes (engine, charset, collation) are managed.
    fn supports_table_attributes(&self) -> bool {
        false
    }

    /// Renders a default value clause body.
    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Null => String::from("NULL"),
            DefaultValue::Bool(b) => self.quote_value(&SqlValue::Bool(*b)),
            DefaultValue::Integer(n) => n.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::String(s) => self.quote_value(&SqlValue::Text(s.clone())),
            DefaultValue::Expression(e) => e.clone(),
        }
    }

    /// Column definition as used in CREATE TABLE and ADD COLUMN.
    fn column_definition(&self, ctx: &SqlContext<'_>, column: &Column) -> String {
        let mut sql = format!("{} {}", ctx.ident(&column.name), self.render_type(column));
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(default));
        }
        sql
    }

    /// Foreign key clause (`CONSTRAINT .. FOREIGN KEY .. REFERENCES ..`).
    fn foreign_key_clause(&self, ctx: &SqlContext<'_>, fk: &ForeignKey) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            ctx.ident(&ctx.physical(&fk.constraint_name())),
            ctx.ident(&fk.column),
            ctx.table(&fk.target_table),
            ctx.ident(&fk.target_column),
            fk.on_delete.as_sql(),
            fk.on_update.as_sql(),
        )
    }

    /// CREATE TABLE plus whatever follow-up statements the engine needs
    /// for indexes.
    fn create_table(&self, ctx: &SqlContext<'_>, table: &Table) -> Vec<String> {
        let mut defs: Vec<String> = table
            .columns
            .values()
            .map(|c| format!("    {}", self.column_definition(ctx, c)))
            .collect();
        if !table.primary_key.is_empty() {
            defs.push(format!(
                "    PRIMARY KEY ({})",
                ctx.column_list(&table.primary_key)
            ));
        }
        if self.inline_foreign_keys() {
            for fk in &table.foreign_keys {
                defs.push(format!("    {}", self.foreign_key_clause(ctx, fk)));
            }
        }
        let mut statements = vec![format!(
            "CREATE TABLE {} (\n{}\n)",
            ctx.table(&table.name),
            defs.join(",\n")
        )];
        statements.extend(table.indexes.iter().map(|i| self.add_index(ctx, &table.name, i)));
        statements
    }

    /// Renames a table.
    fn rename_table(&self, ctx: &SqlContext<'_>, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", ctx.table(from), ctx.table(to))
    }

    /// Adds a column, after `after` where the engine supports positioning.
    fn add_column(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        column: &Column,
        _after: Option<&str>,
    ) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            ctx.table(table),
            self.column_definition(ctx, column)
        )
    }

    /// Renames a column to the declared definition.
    fn change_column(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        old_name: &str,
        column: &Column,
    ) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            ctx.table(table),
            ctx.ident(old_name),
            ctx.ident(&column.name)
        )
    }

    /// Brings an existing column to its declared definition, or `None`
    /// when the engine cannot alter a column in place.
    fn modify_column(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        column: &Column,
        changes: &[ColumnChange],
    ) -> Option<String>;

    /// Drops a column.
    fn drop_column(&self, ctx: &SqlContext<'_>, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            ctx.table(table),
            ctx.ident(column)
        )
    }

    /// Adds an index. Index names are prefixed like tables.
    fn add_index(&self, ctx: &SqlContext<'_>, table: &str, index: &Index) -> String {
        let unique = match index.index_type {
            IndexType::Unique => "UNIQUE ",
            IndexType::Index => "",
        };
        format!(
            "CREATE {unique}INDEX {} ON {} ({})",
            ctx.ident(&ctx.physical(&index.name)),
            ctx.table(table),
            ctx.column_list(&index.columns)
        )
    }

    /// Drops an index by its physical name.
    fn drop_index(&self, ctx: &SqlContext<'_>, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", ctx.ident(name))
    }

    /// Replaces the primary key of `live` with `columns` in one statement,
    /// or `None` when the engine cannot.
    fn alter_primary_key(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        live: &Table,
        columns: &[String],
    ) -> Option<String>;

    /// Adds a foreign key to an existing table.
    fn add_foreign_key(&self, ctx: &SqlContext<'_>, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            ctx.table(&fk.table),
            self.foreign_key_clause(ctx, fk)
        )
    }

    /// Drops a foreign key by its physical name.
    fn drop_foreign_key(&self, ctx: &SqlContext<'_>, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            ctx.table(table),
            ctx.ident(name)
        )
    }

    /// Brings table attributes to their declared values, if the engine
    /// has any.
    fn alter_table_attributes(
        &self,
        _ctx: &SqlContext<'_>,
        _table: &str,
        _declared: &TableAttributes,
        _live: &TableAttributes,
    ) -> Option<String> {
        None
    }

    /// Drops a view if present.
    fn drop_view(&self, ctx: &SqlContext<'_>, name: &str) -> String {
        format!("DROP VIEW IF EXISTS {}", ctx.table(name))
    }

    /// Creates a view.
    fn create_view(&self, ctx: &SqlContext<'_>, view: &View) -> String {
        format!("CREATE VIEW {} AS {}", ctx.table(&view.name), view.sql)
    }
}

/// Collapses whitespace runs into single spaces and trims.
#[must_use]
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("club_id"));
        assert!(is_identifier("2fa"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
        assert!(is_field("clubs.id", false));
        assert!(is_field("clubs.*", true));
        assert!(!is_field("clubs.*", false));
        assert!(!is_field("a.b.c", false));
        assert!(!is_field("id; DROP", false));
    }

    #[test]
    fn quote_styles_escape_closing_quote() {
        assert_eq!(QuoteStyle::Backtick.quote("a`b"), "`a``b`");
        assert_eq!(QuoteStyle::Double.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(QuoteStyle::Bracket.quote("a]b"), "[a]]b]");
    }

    #[test]
    fn dialect_from_url_and_backend() {
        assert_eq!(
            DialectKind::from_url("mysql://root@localhost/db"),
            Ok(DialectKind::MySql)
        );
        assert_eq!(
            DialectKind::from_url("sqlite::memory:"),
            Ok(DialectKind::Sqlite)
        );
        assert_eq!(
            DialectKind::from_backend_name("PostgreSQL"),
            Ok(DialectKind::Postgres)
        );
        assert!(DialectKind::from_url("oracle://x").is_err());
    }

    #[test]
    fn context_prefixes_tables_not_fields() {
        let ctx = SqlContext::new(&MySqlDialect, "app_");
        assert_eq!(ctx.table("clubs"), "`app_clubs`");
        assert_eq!(ctx.field("clubs.name"), "`clubs`.`name`");
        assert_eq!(ctx.field("clubs.*"), "`clubs`.*");
    }
}
