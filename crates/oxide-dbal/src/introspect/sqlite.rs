//! SQLite catalog queries over `sqlite_master` and the table-valued
//! pragma functions.

use oxide_dbal_core::schema::{Column, DefaultValue, ForeignKey, Index};
use oxide_dbal_core::SqlValue;

use super::{flag, group_indexes, opt_text, rule, text};
use crate::connection::Connection;
use crate::error::Result;

async fn names(conn: &Connection, kind: &str) -> Result<Vec<String>> {
    let set = conn
        .fetch_set(
            "SELECT name FROM sqlite_master \
             WHERE type = ? AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
            &[SqlValue::Text(kind.to_string())],
        )
        .await?;
    Ok(set.rows.iter().map(|row| text(row, 0)).collect())
}

pub(super) async fn table_names(conn: &Connection) -> Result<Vec<String>> {
    names(conn, "table").await
}

pub(super) async fn view_names(conn: &Connection) -> Result<Vec<String>> {
    names(conn, "view").await
}

/// `(name, type, notnull, dflt_value, pk)` rows in column order.
async fn table_info(conn: &Connection, table: &str) -> Result<Vec<Vec<SqlValue>>> {
    let set = conn
        .fetch_set(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(set.rows)
}

async fn has_autoincrement(conn: &Connection, table: &str) -> Result<bool> {
    let set = conn
        .fetch_set(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(set
        .rows
        .first()
        .is_some_and(|row| text(row, 0).to_ascii_uppercase().contains("AUTOINCREMENT")))
}

pub(super) async fn field_list(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    let rows = table_info(conn, table).await?;
    let key_columns = rows.iter().filter(|row| flag(row, 4)).count();
    let autoincrement = key_columns == 1 && has_autoincrement(conn, table).await?;
    Ok(rows
        .iter()
        .map(|row| {
            let mut column = Column::new(text(row, 0), text(row, 1)).nullable(!flag(row, 2));
            column.primary_key = flag(row, 4);
            column.auto_increment =
                autoincrement && column.primary_key && column.sql_type.eq_ignore_ascii_case("INTEGER");
            column.default = opt_text(row, 3).and_then(|d| DefaultValue::from_sql_literal(&d));
            column
        })
        .collect())
}

pub(super) async fn primary_key(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut keyed: Vec<(i64, String)> = table_info(conn, table)
        .await?
        .iter()
        .filter_map(|row| {
            let position = row.get(4).and_then(SqlValue::as_i64).unwrap_or(0);
            (position > 0).then(|| (position, text(row, 0)))
        })
        .collect();
    keyed.sort_by_key(|(position, _)| *position);
    Ok(keyed.into_iter().map(|(_, name)| name).collect())
}

pub(super) async fn index_list(conn: &Connection, table: &str) -> Result<Vec<Index>> {
    let list = conn
        .fetch_set(
            "SELECT name, \"unique\", origin FROM pragma_index_list(?) ORDER BY name",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    let mut rows = Vec::new();
    for index in list.rows.iter().filter(|row| text(row, 2) != "pk") {
        let name = text(index, 0);
        let columns = conn
            .fetch_set(
                "SELECT name FROM pragma_index_info(?) ORDER BY seqno",
                &[SqlValue::Text(name.clone())],
            )
            .await?;
        for column in &columns.rows {
            rows.push((name.clone(), flag(index, 1), text(column, 0)));
        }
    }
    Ok(group_indexes(rows))
}

/// SQLite keeps no constraint names; the sync engine assigns the default.
pub(super) async fn foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let set = conn
        .fetch_set(
            "SELECT \"table\", \"from\", \"to\", on_update, on_delete \
             FROM pragma_foreign_key_list(?) ORDER BY id, seq",
            &[SqlValue::Text(table.to_string())],
        )
        .await?;
    Ok(set
        .rows
        .iter()
        .map(|row| {
            ForeignKey::new(table, text(row, 1), text(row, 0), text(row, 2))
                .rules(rule(&text(row, 3)), rule(&text(row, 4)))
        })
        .collect())
}
