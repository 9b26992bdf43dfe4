//! MySQL / MariaDB dialect.

use std::sync::LazyLock;

use regex::Regex;

use super::{collapse_whitespace, ColumnChange, Dialect, DialectKind, QuoteStyle, SqlContext};
use crate::schema::{Column, Index, IndexType, Table, TableAttributes};
use crate::value::SqlValue;

static INT_DISPLAY_WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(TINYINT|SMALLINT|MEDIUMINT|INT|INTEGER|BIGINT)\s*\(\s*\d+\s*\)")
        .expect("valid display width pattern")
});

/// MySQL dialect: backtick quoting, in-place `MODIFY`/`CHANGE COLUMN`,
/// positional `ADD COLUMN .. AFTER`, table options.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Backtick
    }

    fn quote_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Text(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
            other => other.to_sql_inline(),
        }
    }

    fn normalize_type(&self, sql_type: &str) -> String {
        let upper = collapse_whitespace(sql_type).to_ascii_uppercase();
        let stripped = INT_DISPLAY_WIDTH.replace_all(&upper, "$1");
        match stripped.as_ref() {
            "BOOL" | "BOOLEAN" => String::from("TINYINT"),
            other => other
                .replace("INTEGER", "INT")
                .replace(", ", ",")
                .replace(" ,", ","),
        }
    }

    fn supports_table_attributes(&self) -> bool {
        true
    }

    fn column_definition(&self, ctx: &SqlContext<'_>, column: &Column) -> String {
        let mut sql = format!("{} {}", ctx.ident(&column.name), column.sql_type);
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(default));
        }
        if column.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }
        sql
    }

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
        for index in &table.indexes {
            defs.push(format!("    {}", index_clause(ctx, index)));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n{}\n)",
            ctx.table(&table.name),
            defs.join(",\n")
        );
        let attrs = &table.attributes;
        if let Some(engine) = &attrs.engine {
            sql.push_str(&format!(" ENGINE={engine}"));
        }
        if let Some(charset) = &attrs.charset {
            sql.push_str(&format!(" DEFAULT CHARSET={charset}"));
        }
        if let Some(collation) = &attrs.collation {
            sql.push_str(&format!(" COLLATE={collation}"));
        }
        vec![sql]
    }

    fn rename_table(&self, ctx: &SqlContext<'_>, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}", ctx.table(from), ctx.table(to))
    }

    fn add_column(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        column: &Column,
        after: Option<&str>,
    ) -> String {
        let position = after.map_or_else(
            || String::from(" FIRST"),
            |prev| format!(" AFTER {}", ctx.ident(prev)),
        );
        format!(
            "ALTER TABLE {} ADD COLUMN {}{position}",
            ctx.table(table),
            self.column_definition(ctx, column)
        )
    }

    fn change_column(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        old_name: &str,
        column: &Column,
    ) -> String {
        format!(
            "ALTER TABLE {} CHANGE COLUMN {} {}",
            ctx.table(table),
            ctx.ident(old_name),
            self.column_definition(ctx, column)
        )
    }

    fn modify_column(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        column: &Column,
        _changes: &[ColumnChange],
    ) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            ctx.table(table),
            self.column_definition(ctx, column)
        ))
    }

    fn add_index(&self, ctx: &SqlContext<'_>, table: &str, index: &Index) -> String {
        format!("ALTER TABLE {} ADD {}", ctx.table(table), index_clause(ctx, index))
    }

    fn drop_index(&self, ctx: &SqlContext<'_>, table: &str, name: &str) -> String {
        format!("ALTER TABLE {} DROP INDEX {}", ctx.table(table), ctx.ident(name))
    }

    fn alter_primary_key(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        live: &Table,
        columns: &[String],
    ) -> Option<String> {
        let mut clauses = Vec::new();
        if !live.primary_key.is_empty() {
            clauses.push(String::from("DROP PRIMARY KEY"));
        }
        if !columns.is_empty() {
            clauses.push(format!("ADD PRIMARY KEY ({})", ctx.column_list(columns)));
        }
        Some(format!("ALTER TABLE {} {}", ctx.table(table), clauses.join(", ")))
    }

    fn drop_foreign_key(&self, ctx: &SqlContext<'_>, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            ctx.table(table),
            ctx.ident(name)
        )
    }

    fn alter_table_attributes(
        &self,
        ctx: &SqlContext<'_>,
        table: &str,
        declared: &TableAttributes,
        live: &TableAttributes,
    ) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(engine) = &declared.engine {
            if !same_option(Some(engine), live.engine.as_ref()) {
                clauses.push(format!("ENGINE={engine}"));
            }
        }
        let collation_differs = declared
            .collation
            .as_ref()
            .is_some_and(|c| !same_option(Some(c), live.collation.as_ref()));
        let charset_differs = declared
            .charset
            .as_ref()
            .is_some_and(|c| !same_option(Some(c), live.charset.as_ref()));
        if collation_differs || charset_differs {
            let mut convert = String::from("CONVERT TO CHARACTER SET ");
            convert.push_str(
                declared
                    .charset
                    .as_deref()
                    .or(live.charset.as_deref())
                    .unwrap_or("utf8mb4"),
            );
            if let Some(collation) = &declared.collation {
                convert.push_str(&format!(" COLLATE {collation}"));
            }
            clauses.push(convert);
        }
        if clauses.is_empty() {
            None
        } else {
            Some(format!("ALTER TABLE {} {}", ctx.table(table), clauses.join(", ")))
        }
    }
}

fn index_clause(ctx: &SqlContext<'_>, index: &Index) -> String {
    let kind = match index.index_type {
        IndexType::Unique => "UNIQUE INDEX",
        IndexType::Index => "INDEX",
    };
    format!(
        "{kind} {} ({})",
        ctx.ident(&ctx.physical(&index.name)),
        ctx.column_list(&index.columns)
    )
}

fn same_option(a: Option<&String>, b: Option<&String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// Values of an `ENUM(...)` or `SET(...)` column type, in declaration
/// order. Returns an empty list for any other type.
#[must_use]
pub fn extract_enum_values(column_type: &str) -> Vec<String> {
    let trimmed = column_type.trim();
    let lower = trimmed.to_ascii_lowercase();
    let body = if lower.starts_with("enum(") {
        &trimmed[5..]
    } else if lower.starts_with("set(") {
        &trimmed[4..]
    } else {
        return Vec::new();
    };
    let Some(body) = body.strip_suffix(')') else {
        return Vec::new();
    };

    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    let mut in_quote = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' if in_quote && chars.peek() == Some(&'\'') => {
                current.push('\'');
                chars.next();
            }
            '\'' if in_quote => {
                values.push(std::mem::take(&mut current));
                in_quote = false;
            }
            '\'' => in_quote = true,
            '\\' if in_quote => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if in_quote => current.push(c),
            _ => {}
        }
    }
    values
}
