//! PostgreSQL dialect.

use std::borrow::Cow;

use super::{collapse_whitespace, ColumnChange, Dialect, DialectKind, SqlContext};
use crate::schema::{Column, Table};
use crate::value::SqlValue;

/// PostgreSQL dialect: double-quote quoting, `$n` placeholders, identity
/// columns, separate `CREATE INDEX` statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                format!("'\\x{hex}'::bytea")
            }
            other => other.to_sql_inline(),
        }
    }

    fn native_placeholders<'s>(&self, sql: &'s str) -> Cow<'s, str> {
        rewrite_placeholders(sql)
    }

    fn normalize_type(&self, sql_type: &str) -> String {
        let upper = collapse_whitespace(sql_type)
            .to_ascii_uppercase()
            .replace(" UNSIGNED", "");
        let (base, args) = match upper.find('(') {
            Some(idx) => (upper[..idx].trim(), Some(upper[idx..].replace(' ', ""))),
            None => (upper.as_str(), None),
        };
        let integer_family = matches!(
            base,
            "INT" | "INTEGER" | "INT4" | "MEDIUMINT" | "TINYINT" | "SMALLINT" | "INT2" | "BIGINT"
                | "INT8"
        );
        if integer_family {
            // display widths carry no meaning here
            return match base {
                "TINYINT" | "SMALLINT" | "INT2" => String::from("SMALLINT"),
                "BIGINT" | "INT8" => String::from("BIGINT"),
                _ => String::from("INTEGER"),
            };
        }
        let mapped = match base {
            "CHARACTER VARYING" | "VARCHAR" => "VARCHAR",
            "CHARACTER" | "CHAR" | "BPCHAR" => "CHAR",
            "NUMERIC" | "DECIMAL" => "DECIMAL",
            "DATETIME" | "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => "TIMESTAMP",
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => "TIMESTAMPTZ",
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => "DOUBLE PRECISION",
            "FLOAT" | "REAL" | "FLOAT4" => "REAL",
            "BOOL" | "BOOLEAN" => "BOOLEAN",
            "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "TEXT" => "TEXT",
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BYTEA" => "BYTEA",
            other => other,
        };
        match args {
            Some(args) if !matches!(mapped, "TIMESTAMP" | "TIMESTAMPTZ" | "TEXT" | "BYTEA") => {
                format!("{mapped}{args}")
            }
            _ => mapped.to_string(),
        }
    }

    fn render_type(&self, column: &Column) -> String {
        self.normalize_type(&column.sql_type)
    }

    fn column_definition(&self, ctx: &SqlContext<'_>, column: &Column) -> String {
        let mut sql = format!("{} {}", ctx.ident(&column.name), self.render_type(column));
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if column.auto_increment {
            sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        } else if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(default));
        }
        sql
    }

    fn modify_column(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        column: &Column,
        changes: &[ColumnChange],
    ) -> Option<String> {
        let name = ctx.ident(&column.name);
        let clauses: Vec<String> = changes
            .iter()
            .map(|change| match change {
                ColumnChange::Type => {
                    let ty = self.render_type(column);
                    format!("ALTER COLUMN {name} TYPE {ty} USING {name}::{ty}")
                }
                ColumnChange::Null if column.nullable => {
                    format!("ALTER COLUMN {name} DROP NOT NULL")
                }
                ColumnChange::Null => format!("ALTER COLUMN {name} SET NOT NULL"),
                ColumnChange::Default => match &column.default {
                    Some(default) if default.normalized().is_some() => format!(
                        "ALTER COLUMN {name} SET DEFAULT {}",
                        self.render_default(default)
                    ),
                    _ => format!("ALTER COLUMN {name} DROP DEFAULT"),
                },
                ColumnChange::AutoIncrement if column.auto_increment => {
                    format!("ALTER COLUMN {name} ADD GENERATED BY DEFAULT AS IDENTITY")
                }
                ColumnChange::AutoIncrement => {
                    format!("ALTER COLUMN {name} DROP IDENTITY IF EXISTS")
                }
            })
            .collect();
        Some(format!("ALTER TABLE {} {}", ctx.table(table), clauses.join(", ")))
    }

    /// Drops the live key by its introspected constraint name, falling back
    /// to the `<table>_pkey` name Postgres assigns to unnamed keys.
    fn alter_primary_key(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        live: &Table,
        columns: &[String],
    ) -> Option<String> {
        let mut clauses = Vec::new();
        if !live.primary_key.is_empty() {
            let name = live
                .primary_key_name
                .clone()
                .unwrap_or_else(|| format!("{}_pkey", ctx.physical(table)));
            clauses.push(format!("DROP CONSTRAINT {}", ctx.ident(&name)));
        }
        if !columns.is_empty() {
            clauses.push(format!("ADD PRIMARY KEY ({})", ctx.column_list(columns)));
        }
        Some(format!("ALTER TABLE {} {}", ctx.table(table), clauses.join(", ")))
    }
}

/// Rewrites `?` placeholders to `$1`, `$2`, ... leaving question marks
/// inside quoted strings and identifiers untouched.
#[must_use]
pub fn rewrite_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (None, '?') => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, Index, IndexType, Table};

    fn ctx() -> SqlContext<'static> {
        SqlContext::new(&PostgresDialect, "")
    }

    #[test]
    fn placeholders_skip_quoted_text() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM \"a?\" WHERE b = ? AND c = '?' AND d IN (?, ?)"),
            "SELECT * FROM \"a?\" WHERE b = $1 AND c = '?' AND d IN ($2, $3)"
        );
        assert!(matches!(rewrite_placeholders("SELECT 1"), Cow::Borrowed(_)));
    }

    #[test]
    fn types_map_to_postgres_spellings() {
        let d = PostgresDialect;
        assert_eq!(d.normalize_type("INT UNSIGNED"), "INTEGER");
        assert_eq!(d.normalize_type("int(11)"), "INTEGER");
        assert_eq!(d.normalize_type("BIGINT UNSIGNED"), "BIGINT");
        assert_eq!(d.normalize_type("character varying(200)"), "VARCHAR(200)");
        assert_eq!(d.normalize_type("VARCHAR(200)"), "VARCHAR(200)");
        assert_eq!(d.normalize_type("DATETIME"), "TIMESTAMP");
        assert_eq!(d.normalize_type("numeric(10, 2)"), "DECIMAL(10,2)");
        assert_eq!(d.normalize_type("double"), "DOUBLE PRECISION");
    }

    #[test]
    fn create_table_emits_identity_and_separate_indexes() {
        let table = Table::new("clubs")
            .column(Column::new("id", "INT UNSIGNED").auto_increment())
            .column(Column::new("name", "VARCHAR(200)"))
            .primary_key(["id"])
            .index(Index::new("clubs_name_idx", IndexType::Index, ["name"]));
        let statements = PostgresDialect.create_table(&ctx(), &table);
        assert_eq!(
            statements,
            vec![
                String::from(
                    "CREATE TABLE \"clubs\" (\n    \"id\" INTEGER NOT NULL GENERATED BY DEFAULT AS IDENTITY,\n    \
                     \"name\" VARCHAR(200) NOT NULL,\n    PRIMARY KEY (\"id\")\n)"
                ),
                String::from("CREATE INDEX \"clubs_name_idx\" ON \"clubs\" (\"name\")"),
            ]
        );
    }

    #[test]
    fn modify_column_emits_one_clause_per_change() {
        let column = Column::new("name", "VARCHAR(200)")
            .nullable(true)
            .default_value(DefaultValue::String(String::from("x")));
        let sql = PostgresDialect.modify_column(
            &ctx(),
            "clubs",
            &column,
            &[ColumnChange::Type, ColumnChange::Null, ColumnChange::Default],
        );
        assert_eq!(
            sql.as_deref().unwrap_or_default(),
            "ALTER TABLE \"clubs\" ALTER COLUMN \"name\" TYPE VARCHAR(200) USING \"name\"::VARCHAR(200), \
             ALTER COLUMN \"name\" DROP NOT NULL, ALTER COLUMN \"name\" SET DEFAULT 'x'"
        );
    }

    #[test]
    fn primary_key_replacement_drops_the_live_constraint() {
        let ctx = SqlContext::new(&PostgresDialect, "app_");
        let mut live = Table::new("t")
            .column(Column::new("b", "INT"))
            .primary_key(["b"]);
        assert_eq!(
            PostgresDialect
                .alter_primary_key(&ctx, "t", &live, &[String::from("a")])
                .as_deref(),
            Some("ALTER TABLE \"app_t\" DROP CONSTRAINT \"app_t_pkey\", ADD PRIMARY KEY (\"a\")")
        );

        live.primary_key_name = Some(String::from("legacy_t_pk"));
        assert_eq!(
            PostgresDialect
                .alter_primary_key(&ctx, "t", &live, &[String::from("a")])
                .as_deref(),
            Some("ALTER TABLE \"app_t\" DROP CONSTRAINT \"legacy_t_pk\", ADD PRIMARY KEY (\"a\")")
        );
    }

    #[test]
    fn rename_and_views() {
        let c = ctx();
        assert_eq!(
            PostgresDialect.rename_table(&c, "groups", "teams"),
            "ALTER TABLE \"groups\" RENAME TO \"teams\""
        );
        assert_eq!(
            PostgresDialect.drop_view(&c, "v"),
            "DROP VIEW IF EXISTS \"v\""
        );
    }
}
