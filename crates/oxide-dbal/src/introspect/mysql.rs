//! MySQL catalog queries over `information_schema`, scoped to the
//! connection's current database.

use oxide_dbal_core::schema::{Column, DefaultValue, ForeignKey, Index, TableAttributes};
use oxide_dbal_core::SqlValue;

use super::{group_indexes, opt_text, rule, text};
use crate::connection::Connection;
use crate::error::Result;

async fn names(conn: &Connection, table_type: &str) -> Result<Vec<String>> {
    let set = conn
        .fetch_set(
            "SELECT TABLE_NAME FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = ? ORDER BY TABLE_NAME",
            &[SqlValue::Text(table_type.to_string())],
        )
        .await?;
    Ok(set.rows.iter().map(|row| text(row, 0)).collect())
}

pub(super) async fn table_names(conn: &Connection) -> Result<Vec<String>> {
    names(conn, "BASE TABLE").await
}

pub(super) async fn view_names(conn: &Connection) -> Result<Vec<String>> {
    names(conn, "VIEW").await
}

pub(super) async fn field_list(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    let set = conn
        .fetch_set(
            "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(set
        .rows
        .iter()
        .map(|row| {
            let extra = text(row, 4).to_ascii_lowercase();
            let mut column = Column::new(text(row, 0), text(row, 1)).nullable(text(row, 2) == "YES");
            column.auto_increment = extra.contains("auto_increment");
            // defaults are reported unquoted; only generated ones are expressions
            column.default = opt_text(row, 3).map(|raw| {
                if extra.contains("default_generated") {
                    DefaultValue::Expression(raw)
                } else {
                    DefaultValue::String(raw)
                }
            });
            column
        })
        .collect())
}

pub(super) async fn index_list(conn: &Connection, table: &str) -> Result<Vec<Index>> {
    let set = conn
        .fetch_set(
            "SELECT INDEX_NAME, NON_UNIQUE, COLUMN_NAME FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY' \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(group_indexes(
        set.rows
            .iter()
            .map(|row| {
                let non_unique = row.get(1).and_then(SqlValue::as_i64).unwrap_or(1);
                (text(row, 0), non_unique == 0, text(row, 2))
            })
            .collect(),
    ))
}

pub(super) async fn primary_key(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let set = conn
        .fetch_set(
            "SELECT COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
             ORDER BY ORDINAL_POSITION",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(set.rows.iter().map(|row| text(row, 0)).collect())
}

/// Keys declared on `table`, or with `dependent` the keys referencing it.
pub(super) async fn foreign_keys(
    conn: &Connection,
    table: &str,
    dependent: bool,
) -> Result<Vec<ForeignKey>> {
    let filter = if dependent {
        "k.REFERENCED_TABLE_NAME = ?"
    } else {
        "k.TABLE_NAME = ? AND k.REFERENCED_TABLE_NAME IS NOT NULL"
    };
    let sql = format!(
        "SELECT k.CONSTRAINT_NAME, k.TABLE_NAME, k.COLUMN_NAME, k.REFERENCED_TABLE_NAME, \
         k.REFERENCED_COLUMN_NAME, r.UPDATE_RULE, r.DELETE_RULE \
         FROM information_schema.KEY_COLUMN_USAGE k \
         JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
         ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
         WHERE k.TABLE_SCHEMA = DATABASE() AND {filter} \
         ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION"
    );
    let set = conn
        .fetch_set(&sql, &[SqlValue::Text(table.to_string())])
        .await?;
    Ok(set
        .rows
        .iter()
        .map(|row| {
            ForeignKey::new(text(row, 1), text(row, 2), text(row, 3), text(row, 4))
                .rules(rule(&text(row, 5)), rule(&text(row, 6)))
                .named(text(row, 0))
        })
        .collect())
}

pub(super) async fn table_attributes(conn: &Connection, table: &str) -> Result<TableAttributes> {
    let set = conn
        .fetch_set(
            "SELECT t.ENGINE, c.CHARACTER_SET_NAME, t.TABLE_COLLATION \
             FROM information_schema.TABLES t \
             LEFT JOIN information_schema.COLLATION_CHARACTER_SET_APPLICABILITY c \
             ON c.COLLATION_NAME = t.TABLE_COLLATION \
             WHERE t.TABLE_SCHEMA = DATABASE() AND t.TABLE_NAME = ?",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(set
        .rows
        .first()
        .map(|row| TableAttributes {
            engine: opt_text(row, 0),
            charset: opt_text(row, 1),
            collation: opt_text(row, 2),
        })
        .unwrap_or_default())
}
