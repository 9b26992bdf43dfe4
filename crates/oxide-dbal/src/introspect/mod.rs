//! Live schema introspection.
//!
//! Each engine reads its own catalog and reports the same model types the
//! schema parser produces, so the sync planner can compare the two. Table
//! names going in and coming out are unprefixed; index and constraint
//! names are reported as stored.

mod mysql;
mod postgres;
mod sqlite;

use indexmap::IndexMap;
use oxide_dbal_core::dialect::{extract_enum_values, DialectKind};
use oxide_dbal_core::schema::{
    Column, ForeignKey, ForeignKeyRule, Index, IndexType, Schema, Table, TableAttributes, View,
};
use oxide_dbal_core::SqlValue;
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;

impl Connection {
    /// Unprefixed names of the tables carrying this connection's prefix.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let physical = match self.kind() {
            DialectKind::MySql => mysql::table_names(self).await?,
            DialectKind::Postgres => postgres::table_names(self).await?,
            DialectKind::Sqlite => sqlite::table_names(self).await?,
        };
        Ok(self.strip_all(physical))
    }

    /// Unprefixed names of the views carrying this connection's prefix.
    pub async fn view_names(&self) -> Result<Vec<String>> {
        let physical = match self.kind() {
            DialectKind::MySql => mysql::view_names(self).await?,
            DialectKind::Postgres => postgres::view_names(self).await?,
            DialectKind::Sqlite => sqlite::view_names(self).await?,
        };
        Ok(self.strip_all(physical))
    }

    /// Whether `table` exists.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.table_names().await?.iter().any(|t| t == table))
    }

    /// Columns of `table` in ordinal order.
    pub async fn field_list(&self, table: &str) -> Result<IndexMap<String, Column>> {
        let physical = self.ctx().physical(table);
        let columns = match self.kind() {
            DialectKind::MySql => mysql::field_list(self, &physical).await?,
            DialectKind::Postgres => postgres::field_list(self, &physical).await?,
            DialectKind::Sqlite => sqlite::field_list(self, &physical).await?,
        };
        Ok(columns.into_iter().map(|c| (c.name.clone(), c)).collect())
    }

    /// Secondary indexes of `table`; the primary key is not included.
    pub async fn index_list(&self, table: &str) -> Result<Vec<Index>> {
        let physical = self.ctx().physical(table);
        match self.kind() {
            DialectKind::MySql => mysql::index_list(self, &physical).await,
            DialectKind::Postgres => postgres::index_list(self, &physical).await,
            DialectKind::Sqlite => sqlite::index_list(self, &physical).await,
        }
    }

    /// Primary key columns of `table` in key order.
    pub async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let physical = self.ctx().physical(table);
        match self.kind() {
            DialectKind::MySql => mysql::primary_key(self, &physical).await,
            DialectKind::Postgres => postgres::primary_key(self, &physical).await,
            DialectKind::Sqlite => sqlite::primary_key(self, &physical).await,
        }
    }

    /// Constraint name of the primary key of `table`. Only Postgres lets
    /// it vary.
    pub async fn primary_key_name(&self, table: &str) -> Result<Option<String>> {
        match self.kind() {
            DialectKind::Postgres => {
                postgres::primary_key_name(self, &self.ctx().physical(table)).await
            }
            DialectKind::MySql | DialectKind::Sqlite => Ok(None),
        }
    }

    /// Foreign keys declared on `table`.
    pub async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let physical = self.ctx().physical(table);
        let keys = match self.kind() {
            DialectKind::MySql => mysql::foreign_keys(self, &physical, false).await?,
            DialectKind::Postgres => postgres::foreign_keys(self, &physical, false).await?,
            DialectKind::Sqlite => sqlite::foreign_keys(self, &physical).await?,
        };
        Ok(keys.into_iter().map(|fk| self.unprefix_key(fk)).collect())
    }

    /// Foreign keys in other tables that reference `table`.
    pub async fn dependent_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let keys = match self.kind() {
            DialectKind::MySql => {
                mysql::foreign_keys(self, &self.ctx().physical(table), true).await?
            }
            DialectKind::Postgres => {
                postgres::foreign_keys(self, &self.ctx().physical(table), true).await?
            }
            DialectKind::Sqlite => {
                let mut keys = Vec::new();
                for other in self.table_names().await? {
                    keys.extend(
                        self.foreign_keys(&other)
                            .await?
                            .into_iter()
                            .filter(|fk| fk.target_table == table),
                    );
                }
                return Ok(keys);
            }
        };
        Ok(keys.into_iter().map(|fk| self.unprefix_key(fk)).collect())
    }

    /// Allowed values of an `ENUM`/`SET` column; empty for other types.
    pub async fn extract_enum(&self, table: &str, column: &str) -> Result<Vec<String>> {
        Ok(self
            .field_list(table)
            .await?
            .get(column)
            .map(|c| extract_enum_values(&c.sql_type))
            .unwrap_or_default())
    }

    /// Engine, charset and collation of `table`. Only MySQL reports any.
    pub async fn table_attributes(&self, table: &str) -> Result<TableAttributes> {
        match self.kind() {
            DialectKind::MySql => mysql::table_attributes(self, &self.ctx().physical(table)).await,
            DialectKind::Postgres | DialectKind::Sqlite => Ok(TableAttributes::default()),
        }
    }

    /// Reads one table, or `None` if it does not exist.
    pub async fn live_table(&self, table: &str) -> Result<Option<Table>> {
        let columns = self.field_list(table).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        let mut live = Table::new(table);
        live.columns = columns;
        live.primary_key = self.primary_key(table).await?;
        if !live.primary_key.is_empty() {
            live.primary_key_name = self.primary_key_name(table).await?;
        }
        for name in &live.primary_key {
            if let Some(column) = live.columns.get_mut(name) {
                column.primary_key = true;
            }
        }
        live.indexes = self.index_list(table).await?;
        live.foreign_keys = self.foreign_keys(table).await?;
        live.attributes = self.table_attributes(table).await?;
        Ok(Some(live))
    }

    /// Reads those of `names` that exist, plus every view.
    pub async fn live_schema(&self, names: &[String]) -> Result<Schema> {
        let existing = self.table_names().await?;
        let mut schema = Schema::new("live");
        for name in names.iter().filter(|n| existing.contains(n)) {
            if schema.tables.contains_key(name) {
                continue;
            }
            if let Some(table) = self.live_table(name).await? {
                schema.tables.insert(name.clone(), table);
            }
        }
        for view in self.view_names().await? {
            schema.views.insert(view.clone(), View::new(view, ""));
        }
        debug!(
            tables = schema.tables.len(),
            views = schema.views.len(),
            "Live schema read"
        );
        Ok(schema)
    }

    fn strip_all(&self, physical: Vec<String>) -> Vec<String> {
        let prefix = self.prefix();
        physical
            .into_iter()
            .filter_map(|name| name.strip_prefix(prefix).map(str::to_string))
            .filter(|name| name != crate::lock::SQLITE_LOCK_TABLE)
            .collect()
    }

    fn unprefix(&self, name: String) -> String {
        match name.strip_prefix(self.prefix()) {
            Some(stripped) => stripped.to_string(),
            None => name,
        }
    }

    fn unprefix_key(&self, mut fk: ForeignKey) -> ForeignKey {
        fk.table = self.unprefix(fk.table);
        fk.target_table = self.unprefix(fk.target_table);
        fk
    }
}

fn text(row: &[SqlValue], index: usize) -> String {
    row.get(index).map(SqlValue::to_key).unwrap_or_default()
}

fn opt_text(row: &[SqlValue], index: usize) -> Option<String> {
    match row.get(index) {
        None | Some(SqlValue::Null) => None,
        Some(value) => Some(value.to_key()),
    }
}

fn flag(row: &[SqlValue], index: usize) -> bool {
    row.get(index)
        .and_then(|v| v.as_bool().or_else(|| v.as_i64().map(|n| n != 0)))
        .unwrap_or(false)
}

fn rule(text: &str) -> ForeignKeyRule {
    text.parse().unwrap_or(ForeignKeyRule::NoAction)
}

/// Groups `(name, unique, column)` rows, already ordered by name and key
/// position, into indexes.
fn group_indexes(rows: Vec<(String, bool, String)>) -> Vec<Index> {
    let mut grouped: IndexMap<String, (bool, Vec<String>)> = IndexMap::new();
    for (name, unique, column) in rows {
        grouped
            .entry(name)
            .or_insert_with(|| (unique, Vec::new()))
            .1
            .push(column);
    }
    grouped
        .into_iter()
        .map(|(name, (unique, columns))| {
            let index_type = if unique {
                IndexType::Unique
            } else {
                IndexType::Index
            };
            Index::new(name, index_type, columns)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_group_in_row_order() {
        let indexes = group_indexes(vec![
            (String::from("idx_b"), false, String::from("x")),
            (String::from("idx_b"), false, String::from("y")),
            (String::from("uniq_a"), true, String::from("z")),
        ]);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].columns, vec!["x", "y"]);
        assert_eq!(indexes[1].index_type, IndexType::Unique);
    }

    #[test]
    fn catalog_values() {
        let row = vec![SqlValue::Null, SqlValue::Int(1), SqlValue::Text(String::from("YES"))];
        assert_eq!(opt_text(&row, 0), None);
        assert_eq!(text(&row, 2), "YES");
        assert!(flag(&row, 1));
        assert!(!flag(&row, 0));
        assert_eq!(rule("SET NULL"), ForeignKeyRule::SetNull);
        assert_eq!(rule("SET DEFAULT"), ForeignKeyRule::NoAction);
    }
}
