//! SQLite dialect.

use super::{collapse_whitespace, ColumnChange, Dialect, DialectKind, SqlContext};
use crate::schema::{Column, DefaultValue, Table};

/// SQLite dialect. Columns, primary keys and foreign keys of an existing
/// table cannot be altered in place; foreign keys are declared inside
/// `CREATE TABLE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    fn definition(ctx: &SqlContext<'_>, column: &Column, inline_key: bool) -> String {
        let d = ctx.dialect();
        if inline_key {
            return format!(
                "{} INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT",
                ctx.ident(&column.name)
            );
        }
        let mut sql = format!("{} {}", ctx.ident(&column.name), d.render_type(column));
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&d.render_default(default));
        }
        sql
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "SQLite"
    }

    /// Integer affinity: every type containing `INT` is `INTEGER`.
    fn normalize_type(&self, sql_type: &str) -> String {
        let upper = collapse_whitespace(sql_type).to_ascii_uppercase();
        if upper.contains("INT") {
            String::from("INTEGER")
        } else {
            upper
        }
    }

    fn render_type(&self, column: &Column) -> String {
        if column.auto_increment {
            String::from("INTEGER")
        } else {
            column.sql_type.clone()
        }
    }

    fn supports_alter_foreign_key(&self) -> bool {
        false
    }

    fn inline_foreign_keys(&self) -> bool {
        true
    }

    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Expression(e) => {
                let upper = e.trim().to_ascii_uppercase();
                if matches!(
                    upper.as_str(),
                    "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME"
                ) || e.trim().starts_with('(')
                {
                    e.trim().to_string()
                } else {
                    format!("({})", e.trim())
                }
            }
            DefaultValue::Null => String::from("NULL"),
            DefaultValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            DefaultValue::Integer(n) => n.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn column_definition(&self, ctx: &SqlContext<'_>, column: &Column) -> String {
        Self::definition(ctx, column, false)
    }

    fn create_table(&self, ctx: &SqlContext<'_>, table: &Table) -> Vec<String> {
        let inline_key = table.auto_increment_key().map(|c| c.name.as_str());
        let mut defs: Vec<String> = table
            .columns
            .values()
            .map(|c| {
                format!(
                    "    {}",
                    Self::definition(ctx, c, inline_key == Some(c.name.as_str()))
                )
            })
            .collect();
        if inline_key.is_none() && !table.primary_key.is_empty() {
            defs.push(format!(
                "    PRIMARY KEY ({})",
                ctx.column_list(&table.primary_key)
            ));
        }
        for fk in &table.foreign_keys {
            defs.push(format!("    {}", self.foreign_key_clause(ctx, fk)));
        }
        let mut statements = vec![format!(
            "CREATE TABLE {} (\n{}\n)",
            ctx.table(&table.name),
            defs.join(",\n")
        )];
        statements.extend(table.indexes.iter().map(|i| self.add_index(ctx, &table.name, i)));
        statements
    }

    /// SQLite cannot alter a column in place.
    fn modify_column(
        &self,
        _ctx: &SqlContext<'_>,
        _table: &str,
        _column: &Column,
        _changes: &[ColumnChange],
    ) -> Option<String> {
        None
    }

    /// SQLite cannot replace a primary key in place.
    fn alter_primary_key(
        &self,
        _ctx: &SqlContext<'_>,
        _table: &str,
        _live: &Table,
        _columns: &[String],
    ) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::schema::{ForeignKey, ForeignKeyRule, Index, IndexType};

    fn ctx() -> SqlContext<'static> {
        SqlContext::new(&SqliteDialect, "")
    }

    #[test]
    fn auto_increment_key_is_inline() {
        let table = Table::new("clubs")
            .column(Column::new("id", "INT UNSIGNED").auto_increment())
            .column(Column::new("name", "VARCHAR(200)"))
            .primary_key(["id"]);
        assert_eq!(
            SqliteDialect.create_table(&ctx(), &table),
            vec![String::from(
                "CREATE TABLE \"clubs\" (\n    \"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,\n    \
                 \"name\" VARCHAR(200) NOT NULL\n)"
            )]
        );
    }

    #[test]
    fn composite_key_and_inline_foreign_keys() {
        let table = Table::new("memberships")
            .column(Column::new("player_id", "INT UNSIGNED"))
            .column(Column::new("club_id", "INT UNSIGNED"))
            .primary_key(["player_id", "club_id"])
            .index(Index::new("memberships_club_id_idx", IndexType::Index, ["club_id"]))
            .foreign_key(
                ForeignKey::new("memberships", "club_id", "clubs", "id")
                    .rules(ForeignKeyRule::Restrict, ForeignKeyRule::Cascade),
            );
        let statements = SqliteDialect.create_table(&ctx(), &table);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("    PRIMARY KEY (\"player_id\", \"club_id\"),\n"));
        assert!(statements[0].contains(
            "CONSTRAINT \"fk_memberships_club_id\" FOREIGN KEY (\"club_id\") REFERENCES \"clubs\" (\"id\") \
             ON DELETE CASCADE ON UPDATE RESTRICT"
        ));
        assert_eq!(
            statements[1],
            "CREATE INDEX \"memberships_club_id_idx\" ON \"memberships\" (\"club_id\")"
        );
    }

    #[test]
    fn integer_affinity() {
        assert_eq!(SqliteDialect.normalize_type("INT UNSIGNED"), "INTEGER");
        assert_eq!(SqliteDialect.normalize_type("bigint"), "INTEGER");
        assert_eq!(SqliteDialect.normalize_type("varchar(200)"), "VARCHAR(200)");
    }

    #[test]
    fn expression_defaults_are_parenthesized() {
        let d = SqliteDialect;
        assert_eq!(
            d.render_default(&DefaultValue::Expression(String::from("CURRENT_TIMESTAMP"))),
            "CURRENT_TIMESTAMP"
        );
        assert_eq!(
            d.render_default(&DefaultValue::Expression(String::from("datetime('now')"))),
            "(datetime('now'))"
        );
    }

    #[test]
    fn capabilities() {
        let d = SqliteDialect;
        let clubs = Table::new("clubs")
            .column(Column::new("id", "INT UNSIGNED"))
            .primary_key(["id"]);
        assert_eq!(
            d.modify_column(&ctx(), "clubs", &clubs.columns["id"], &[ColumnChange::Type]),
            None
        );
        assert_eq!(
            d.alter_primary_key(&ctx(), "clubs", &clubs, &[String::from("name")]),
            None
        );
        assert!(!d.supports_alter_foreign_key());
        assert!(d.inline_foreign_keys());
        assert!(!d.supports_table_attributes());
    }
}
