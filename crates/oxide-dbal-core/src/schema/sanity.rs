//! Read-only consistency check over a merged schema.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::model::{ForeignKeyRule, Schema, Table};

static ID_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(BIG)?INT UNSIGNED$").expect("valid id type pattern"));

fn canonical(sql_type: &str) -> String {
    sql_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

fn same_type(a: &str, b: &str) -> bool {
    canonical(a) == canonical(b)
}

impl Schema {
    /// Lints every table and returns the problems found, keyed by table.
    /// An empty map means the schema is consistent.
    ///
    /// This never fails; callers decide whether to proceed.
    #[must_use]
    pub fn sanity_check(&self) -> IndexMap<String, Vec<String>> {
        let mut report = IndexMap::new();
        for table in self.tables.values() {
            let problems = self.check_table(table);
            if !problems.is_empty() {
                report.insert(table.name.clone(), problems);
            }
        }
        report
    }

    fn check_table(&self, table: &Table) -> Vec<String> {
        let mut problems = Vec::new();
        if table.columns.is_empty() {
            problems.push(String::from("table has no columns"));
        }

        if let Some(id) = table.get_column("id") {
            if !ID_TYPE.is_match(&canonical(&id.sql_type)) {
                problems.push(format!(
                    "column 'id' must be INT UNSIGNED or BIGINT UNSIGNED, found '{}'",
                    id.sql_type
                ));
            }
            if id.auto_increment && table.primary_key != ["id"] {
                problems.push(format!(
                    "auto-increment 'id' requires primary key (id), found ({})",
                    table.primary_key.join(", ")
                ));
            }
        }

        if table.primary_key.is_empty() {
            problems.push(String::from("no primary key declared"));
        }
        for column in &table.primary_key {
            if table.get_column(column).is_none() {
                problems.push(format!("primary key column '{column}' does not exist"));
            }
        }
        for index in &table.indexes {
            for column in &index.columns {
                if table.get_column(column).is_none() {
                    problems.push(format!(
                        "index '{}' references unknown column '{column}'",
                        index.name
                    ));
                }
            }
        }

        for fk in &table.foreign_keys {
            let name = fk.constraint_name();
            let Some(source) = table.get_column(&fk.column) else {
                problems.push(format!("foreign key {name}: column '{}' does not exist", fk.column));
                continue;
            };
            let Some(target_table) = self.get_table(&fk.target_table) else {
                problems.push(format!(
                    "foreign key {name}: target table '{}' does not exist",
                    fk.target_table
                ));
                continue;
            };
            let Some(target) = target_table.get_column(&fk.target_column) else {
                problems.push(format!(
                    "foreign key {name}: target column '{}.{}' does not exist",
                    fk.target_table, fk.target_column
                ));
                continue;
            };
            if !same_type(&source.sql_type, &target.sql_type) {
                problems.push(format!(
                    "foreign key {name}: type '{}' does not match target type '{}'",
                    source.sql_type, target.sql_type
                ));
            }
            let sets_null = fk.on_update == ForeignKeyRule::SetNull
                || fk.on_delete == ForeignKeyRule::SetNull;
            if sets_null && !source.nullable {
                problems.push(format!(
                    "foreign key {name}: SET NULL rule requires nullable column '{}'",
                    fk.column
                ));
            }
            if !target_table.is_indexed(&fk.target_column) {
                problems.push(format!(
                    "foreign key {name}: target column '{}.{}' is not indexed",
                    fk.target_table, fk.target_column
                ));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::{Column, ForeignKey, ForeignKeyRule, Index, IndexType, Schema, Table};

    fn clubs() -> Table {
        Table::new("clubs")
            .column(Column::new("id", "INT UNSIGNED").auto_increment())
            .column(Column::new("code", "CHAR(3)"))
            .primary_key(["id"])
    }

    #[test]
    fn consistent_schema_has_no_problems() {
        let schema = Schema::new("league").table(clubs()).table(
            Table::new("players")
                .column(Column::new("id", "bigint  unsigned").auto_increment())
                .column(Column::new("club_id", "int unsigned").nullable(true))
                .primary_key(["id"])
                .foreign_key(ForeignKey::new("players", "club_id", "clubs", "id").rules(
                    ForeignKeyRule::Cascade,
                    ForeignKeyRule::SetNull,
                )),
        );
        assert!(schema.sanity_check().is_empty(), "{:?}", schema.sanity_check());
    }

    #[test]
    fn id_column_rules() {
        let schema = Schema::new("x").table(
            Table::new("t")
                .column(Column::new("id", "VARCHAR(10)").auto_increment())
                .column(Column::new("other", "INT"))
                .primary_key(["id", "other"]),
        );
        let report = schema.sanity_check();
        assert_eq!(report["t"].len(), 2, "{:?}", report["t"]);
        assert!(report["t"][0].contains("INT UNSIGNED"));
        assert!(report["t"][1].contains("primary key (id)"));
    }

    #[test]
    fn missing_primary_key_and_columns() {
        let schema = Schema::new("x").table(Table::new("empty"));
        assert_eq!(
            schema.sanity_check()["empty"],
            ["table has no columns", "no primary key declared"]
        );
    }

    #[test]
    fn foreign_key_rules() {
        let schema = Schema::new("x").table(clubs()).table(
            Table::new("players")
                .column(Column::new("id", "INT UNSIGNED").auto_increment())
                .column(Column::new("club_code", "CHAR(4)"))
                .column(Column::new("club_id", "INT UNSIGNED"))
                .primary_key(["id"])
                .index(Index::new("players_club_id_idx", IndexType::Index, ["club_id"]))
                // code is neither indexed nor of the same type
                .foreign_key(ForeignKey::new("players", "club_code", "clubs", "code"))
                // SET NULL on a NOT NULL column
                .foreign_key(ForeignKey::new("players", "club_id", "clubs", "id").rules(
                    ForeignKeyRule::SetNull,
                    ForeignKeyRule::Restrict,
                ))
                .foreign_key(ForeignKey::new("players", "club_id", "leagues", "id")),
        );
        let report = schema.sanity_check();
        let problems = &report["players"];
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems[0].contains("does not match"));
        assert!(problems[1].contains("not indexed"));
        assert!(problems[2].contains("SET NULL"));
        assert!(problems[3].contains("'leagues' does not exist"));
    }
}
