//! PostgreSQL catalog queries, scoped to `current_schema()`.
//!
//! Catalog values are cast to `text`/`bigint` so they decode through the
//! generic driver.

use oxide_dbal_core::schema::{Column, DefaultValue, ForeignKey, ForeignKeyRule, Index};
use oxide_dbal_core::SqlValue;

use super::{flag, group_indexes, opt_text, text};
use crate::connection::Connection;
use crate::error::Result;

pub(super) async fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let set = conn
        .fetch_set(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            &[],
        )
        .await?;
    Ok(set.rows.iter().map(|row| text(row, 0)).collect())
}

pub(super) async fn view_names(conn: &Connection) -> Result<Vec<String>> {
    let set = conn
        .fetch_set(
            "SELECT table_name::text FROM information_schema.views \
             WHERE table_schema = current_schema() ORDER BY table_name",
            &[],
        )
        .await?;
    Ok(set.rows.iter().map(|row| text(row, 0)).collect())
}

/// Rebuilds a DDL type from the split catalog columns.
fn column_type(
    data_type: &str,
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    match (data_type, length, precision, scale) {
        (_, Some(length), _, _) => format!("{data_type}({length})"),
        ("numeric", _, Some(precision), Some(scale)) => format!("numeric({precision},{scale})"),
        _ => data_type.to_string(),
    }
}

pub(super) async fn field_list(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    let set = conn
        .fetch_set(
            "SELECT column_name::text, data_type::text, character_maximum_length::bigint, \
             numeric_precision::bigint, numeric_scale::bigint, is_nullable::text, \
             column_default::text, is_identity::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = ? \
             ORDER BY ordinal_position",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(set
        .rows
        .iter()
        .map(|row| {
            let number = |i: usize| row.get(i).and_then(SqlValue::as_i64);
            let sql_type = column_type(&text(row, 1), number(2), number(3), number(4));
            let default = opt_text(row, 6);
            let serial = default.as_deref().is_some_and(|d| d.starts_with("nextval("));
            let mut column = Column::new(text(row, 0), sql_type).nullable(text(row, 5) == "YES");
            column.auto_increment = serial || text(row, 7) == "YES";
            if !column.auto_increment {
                column.default = default.as_deref().and_then(DefaultValue::from_sql_literal);
            }
            column
        })
        .collect())
}

const INDEX_COLUMNS: &str = "FROM pg_index ix \
     JOIN pg_class t ON t.oid = ix.indrelid \
     JOIN pg_class i ON i.oid = ix.indexrelid \
     JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
     WHERE t.relname = ? AND t.relnamespace = current_schema()::regnamespace";

pub(super) async fn index_list(conn: &Connection, table: &str) -> Result<Vec<Index>> {
    let sql = format!(
        "SELECT i.relname::text, ix.indisunique, a.attname::text {INDEX_COLUMNS} \
         AND NOT ix.indisprimary ORDER BY i.relname, k.ord"
    );
    let set = conn
        .fetch_set(&sql, &[SqlValue::Text(table.to_string())])
        .await?;
    Ok(group_indexes(
        set.rows
            .iter()
            .map(|row| (text(row, 0), flag(row, 1), text(row, 2)))
            .collect(),
    ))
}

pub(super) async fn primary_key(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let sql = format!("SELECT a.attname::text {INDEX_COLUMNS} AND ix.indisprimary ORDER BY k.ord");
    let set = conn
        .fetch_set(&sql, &[SqlValue::Text(table.to_string())])
        .await?;
    Ok(set.rows.iter().map(|row| text(row, 0)).collect())
}

pub(super) async fn primary_key_name(conn: &Connection, table: &str) -> Result<Option<String>> {
    let sql = format!("SELECT DISTINCT i.relname::text {INDEX_COLUMNS} AND ix.indisprimary");
    let set = conn
        .fetch_set(&sql, &[SqlValue::Text(table.to_string())])
        .await?;
    Ok(set.rows.first().map(|row| text(row, 0)))
}

fn action(code: &str) -> ForeignKeyRule {
    match code {
        "r" => ForeignKeyRule::Restrict,
        "c" => ForeignKeyRule::Cascade,
        "n" => ForeignKeyRule::SetNull,
        _ => ForeignKeyRule::NoAction,
    }
}

/// Keys declared on `table`, or with `dependent` the keys referencing it.
pub(super) async fn foreign_keys(
    conn: &Connection,
    table: &str,
    dependent: bool,
) -> Result<Vec<ForeignKey>> {
    let filter = if dependent { "rt.relname = ?" } else { "t.relname = ?" };
    let sql = format!(
        "SELECT c.conname::text, t.relname::text, a.attname::text, rt.relname::text, \
         ra.attname::text, c.confupdtype::text, c.confdeltype::text \
         FROM pg_constraint c \
         JOIN pg_class t ON t.oid = c.conrelid \
         JOIN pg_class rt ON rt.oid = c.confrelid \
         JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = c.conkey[1] \
         JOIN pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = c.confkey[1] \
         WHERE c.contype = 'f' AND t.relnamespace = current_schema()::regnamespace AND {filter} \
         ORDER BY t.relname, c.conname"
    );
    let set = conn
        .fetch_set(&sql, &[SqlValue::Text(table.to_string())])
        .await?;
    Ok(set
        .rows
        .iter()
        .map(|row| {
            ForeignKey::new(text(row, 1), text(row, 2), text(row, 3), text(row, 4))
                .rules(action(&text(row, 5)), action(&text(row, 6)))
                .named(text(row, 0))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_types() {
        assert_eq!(
            column_type("character varying", Some(200), None, None),
            "character varying(200)"
        );
        assert_eq!(column_type("numeric", None, Some(10), Some(2)), "numeric(10,2)");
        assert_eq!(column_type("integer", None, Some(32), Some(0)), "integer");
    }

    #[test]
    fn referential_actions() {
        assert_eq!(action("c"), ForeignKeyRule::Cascade);
        assert_eq!(action("a"), ForeignKeyRule::NoAction);
    }
}
