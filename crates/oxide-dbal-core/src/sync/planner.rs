//! Declared-versus-live diff.

use std::collections::HashSet;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{Category, Fix, FixKind, ForeignKeyCheck, SyncActions, SyncPlan, SyncWarning};
use crate::dialect::{ColumnChange, Dialect, SqlContext};
use crate::error::BuildError;
use crate::query::Insert;
use crate::schema::{Column, DefaultValue, ForeignKey, Index, Record, Schema, Table};
use crate::value::SqlValue;

/// Plans the DDL that converges `live` to `declared`.
///
/// Both schemas are keyed by unprefixed table names; live index and
/// constraint names are physical. Tables are never dropped.
///
/// # Errors
///
/// Fails only when a default record cannot be rendered.
pub fn plan(
    ctx: &SqlContext<'_>,
    declared: &Schema,
    live: &Schema,
    actions: &SyncActions,
) -> Result<SyncPlan, BuildError> {
    let mut planner = Planner {
        ctx,
        dialect: ctx.dialect(),
        declared,
        live,
        actions,
        plan: SyncPlan::default(),
    };
    for table in declared.tables.values() {
        match live.tables.get(&table.name) {
            Some(live_table) => planner.existing_table(table, live_table),
            None if actions.create => planner.missing_table(table)?,
            None => {}
        }
    }
    if actions.views {
        for view in declared.views.values() {
            let heading = format!("Recreate view {}", view.name);
            planner.plan.push(
                Category::Views,
                &view.name,
                heading.clone(),
                planner.dialect.drop_view(ctx, &view.name),
            );
            planner.plan.push(
                Category::Views,
                &view.name,
                heading,
                planner.dialect.create_view(ctx, view),
            );
        }
    }
    let plan = planner.plan.finish();
    debug!(
        statements = plan.statements.len(),
        warnings = plan.warnings.len(),
        "Planned schema sync"
    );
    Ok(plan)
}

/// Differences between a declared and a live column.
fn column_changes(dialect: &dyn Dialect, declared: &Column, live: &Column) -> Vec<ColumnChange> {
    let mut changes = Vec::new();
    if dialect.normalize_type(&dialect.render_type(declared)) != dialect.normalize_type(&live.sql_type)
    {
        changes.push(ColumnChange::Type);
    }
    if declared.nullable != live.nullable {
        changes.push(ColumnChange::Null);
    }
    let declared_default = declared.default.as_ref().and_then(DefaultValue::normalized);
    let live_default = live.default.as_ref().and_then(DefaultValue::normalized);
    if !declared.auto_increment && declared_default != live_default {
        changes.push(ColumnChange::Default);
    }
    if declared.auto_increment != live.auto_increment {
        changes.push(ColumnChange::AutoIncrement);
    }
    changes
}

fn resolve_record_value(raw: &str) -> SqlValue {
    match raw {
        "now()" => SqlValue::Text(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        "uuid()" => SqlValue::Text(Uuid::new_v4().to_string()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn insert_record(ctx: &SqlContext<'_>, table: &str, record: &Record) -> Result<String, BuildError> {
    Insert::into(table)
        .values(record.iter().map(|(k, v)| (k.clone(), resolve_record_value(v))))
        .build_inline(ctx)
}

fn live_constraint_name(ctx: &SqlContext<'_>, fk: &ForeignKey) -> String {
    fk.name
        .clone()
        .unwrap_or_else(|| ctx.physical(&fk.constraint_name()))
}

struct Planner<'p, 'c> {
    ctx: &'p SqlContext<'c>,
    dialect: &'c dyn Dialect,
    declared: &'p Schema,
    live: &'p Schema,
    actions: &'p SyncActions,
    plan: SyncPlan,
}

impl Planner<'_, '_> {
    fn unsupported(&mut self, table: &str, change: String) {
        self.plan.warnings.push(SyncWarning::Unsupported {
            table: table.to_string(),
            change,
        });
    }

    // ========================================================================
    // Missing tables
    // ========================================================================

    fn missing_table(&mut self, table: &Table) -> Result<(), BuildError> {
        let renamed_from = table.previous_names.iter().find(|old| {
            self.live.tables.contains_key(old.as_str())
                && !self.declared.tables.contains_key(old.as_str())
        });
        if let Some(old) = renamed_from {
            self.plan.push(
                Category::RenameTable,
                &table.name,
                format!("Rename table {old} to {}", table.name),
                self.dialect.rename_table(self.ctx, old, &table.name),
            );
            return Ok(());
        }

        for sql in self.dialect.create_table(self.ctx, table) {
            self.plan.push(
                Category::AddTable,
                &table.name,
                format!("Create table {}", table.name),
                sql,
            );
        }
        for record in &table.default_records {
            self.plan.push(
                Category::InsertRecord,
                &table.name,
                format!("Insert default record into {}", table.name),
                insert_record(self.ctx, &table.name, record)?,
            );
        }
        if self.actions.foreign_key && !self.dialect.inline_foreign_keys() {
            for fk in &table.foreign_keys {
                self.plan.push(
                    Category::AddForeignKey,
                    &table.name,
                    format!("Add foreign key {}", self.ctx.physical(&fk.constraint_name())),
                    self.dialect.add_foreign_key(self.ctx, fk),
                );
            }
        }
        Ok(())
    }

    // ========================================================================
    // Existing tables
    // ========================================================================

    fn existing_table(&mut self, table: &Table, live: &Table) {
        if self.actions.table_attributes && self.dialect.supports_table_attributes() {
            if let Some(sql) = self.dialect.alter_table_attributes(
                self.ctx,
                &table.name,
                &table.attributes,
                &live.attributes,
            ) {
                self.plan.push(
                    Category::AlterTable,
                    &table.name,
                    format!("Alter table {} attributes", table.name),
                    sql,
                );
            }
        }
        if self.actions.primary_key {
            self.primary_key(table, live);
        }

        let mut renamed = HashSet::new();
        if self.actions.column {
            self.columns(table, live, &mut renamed);
        }
        let mut dropped_indexes = HashSet::new();
        if self.actions.index {
            self.indexes(table, live, &mut dropped_indexes);
        }
        if self.actions.foreign_key {
            self.foreign_keys(table, live);
        }
        if self.actions.remove {
            self.remove(table, live, &renamed, &dropped_indexes);
        }
    }

    fn primary_key(&mut self, table: &Table, live: &Table) {
        if table.primary_key == live.primary_key {
            return;
        }
        let change = format!(
            "alter primary key ({}) to ({})",
            live.primary_key.join(", "),
            table.primary_key.join(", ")
        );
        let sql = self
            .dialect
            .alter_primary_key(self.ctx, &table.name, live, &table.primary_key);
        let Some(sql) = sql else {
            self.unsupported(&table.name, change);
            return;
        };
        self.plan.push(
            Category::AlterPrimaryKey,
            &table.name,
            format!(
                "Alter primary key of {} ({})",
                table.name,
                table.primary_key.join(", ")
            ),
            sql,
        );
    }

    fn columns(&mut self, table: &Table, live: &Table, renamed: &mut HashSet<String>) {
        let mut previous: Option<&str> = None;
        for column in table.columns.values() {
            match live.columns.get(&column.name) {
                Some(live_column) => {
                    let changes = column_changes(self.dialect, column, live_column);
                    if !changes.is_empty() {
                        let what = changes
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        match self
                            .dialect
                            .modify_column(self.ctx, &table.name, column, &changes)
                        {
                            Some(sql) => self.plan.push(
                                Category::AlterColumn,
                                &table.name,
                                format!("Modify column {}.{} ({what})", table.name, column.name),
                                sql,
                            ),
                            None => self.unsupported(
                                &table.name,
                                format!("modify column {} ({what})", column.name),
                            ),
                        }
                    }
                }
                None => {
                    let renamed_from = column.previous_names.iter().find(|old| {
                        live.columns.contains_key(old.as_str())
                            && !table.columns.contains_key(old.as_str())
                            && !renamed.contains(old.as_str())
                    });
                    if let Some(old) = renamed_from {
                        renamed.insert(old.clone());
                        self.plan.push(
                            Category::RenameColumn,
                            &table.name,
                            format!("Rename column {}.{old} to {}", table.name, column.name),
                            self.dialect
                                .change_column(self.ctx, &table.name, old, column),
                        );
                    } else {
                        self.plan.push(
                            Category::AddColumn,
                            &table.name,
                            format!("Add column {}.{}", table.name, column.name),
                            self.dialect
                                .add_column(self.ctx, &table.name, column, previous),
                        );
                    }
                }
            }
            previous = Some(&column.name);
        }
    }

    fn indexes(&mut self, table: &Table, live: &Table, dropped: &mut HashSet<String>) {
        for index in &table.indexes {
            let matching = live
                .indexes
                .iter()
                .find(|l| l.columns == index.columns && !dropped.contains(&l.name));
            match matching {
                Some(existing) if existing.index_type == index.index_type => {}
                Some(existing) => {
                    dropped.insert(existing.name.clone());
                    self.plan.push(
                        Category::DropIndex,
                        &table.name,
                        format!(
                            "Drop index {} (becomes {})",
                            existing.name, index.index_type
                        ),
                        self.dialect
                            .drop_index(self.ctx, &table.name, &existing.name),
                    );
                    self.add_index(table, index);
                }
                None => self.add_index(table, index),
            }
        }
    }

    fn add_index(&mut self, table: &Table, index: &Index) {
        self.plan.push(
            Category::AddIndex,
            &table.name,
            format!(
                "Add {} {} ({})",
                index.index_type,
                self.ctx.physical(&index.name),
                index.columns.join(", ")
            ),
            self.dialect.add_index(self.ctx, &table.name, index),
        );
    }

    fn foreign_keys(&mut self, table: &Table, live: &Table) {
        for fk in &table.foreign_keys {
            let matches: Vec<&ForeignKey> =
                live.foreign_keys.iter().filter(|l| fk.matches(l)).collect();
            let constraint = self.ctx.physical(&fk.constraint_name());
            match matches.len() {
                0 if self.dialect.supports_alter_foreign_key() => {
                    self.plan.push(
                        Category::AddForeignKey,
                        &table.name,
                        format!("Add foreign key {constraint}"),
                        self.dialect.add_foreign_key(self.ctx, fk),
                    );
                    self.plan
                        .foreign_key_checks
                        .push(ForeignKeyCheck::new(self.ctx, fk));
                }
                0 => self.unsupported(
                    &table.name,
                    format!("add foreign key {constraint} on {}", fk.column),
                ),
                1 => {}
                _ => {
                    let duplicates: Vec<String> = matches[1..]
                        .iter()
                        .map(|l| live_constraint_name(self.ctx, l))
                        .collect();
                    let fixes = duplicates
                        .iter()
                        .map(|name| Fix {
                            kind: FixKind::DropDuplicate,
                            sql: self.dialect.drop_foreign_key(self.ctx, &table.name, name),
                            params: Vec::new(),
                        })
                        .collect::<Vec<_>>();
                    self.plan
                        .fixes
                        .entry(constraint.clone())
                        .or_default()
                        .extend(fixes);
                    self.plan.warnings.push(SyncWarning::DuplicateForeignKeys {
                        table: table.name.clone(),
                        constraint,
                        duplicates,
                    });
                }
            }
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    fn remove(
        &mut self,
        table: &Table,
        live: &Table,
        renamed: &HashSet<String>,
        dropped_indexes: &HashSet<String>,
    ) {
        for fk in &live.foreign_keys {
            if table.foreign_keys.iter().any(|d| d.matches(fk)) {
                continue;
            }
            let name = live_constraint_name(self.ctx, fk);
            if self.dialect.supports_alter_foreign_key() {
                self.plan.push(
                    Category::DropForeignKey,
                    &table.name,
                    format!("Drop foreign key {name}"),
                    self.dialect.drop_foreign_key(self.ctx, &table.name, &name),
                );
            } else {
                self.unsupported(&table.name, format!("drop foreign key {name}"));
            }
        }

        for index in &live.indexes {
            let declared = table
                .indexes
                .iter()
                .any(|d| d.columns == index.columns && d.index_type == index.index_type);
            if declared || dropped_indexes.contains(&index.name) {
                continue;
            }
            self.plan.push(
                Category::DropIndex,
                &table.name,
                format!("Drop index {}", index.name),
                self.dialect.drop_index(self.ctx, &table.name, &index.name),
            );
        }

        for name in live.columns.keys() {
            if table.columns.contains_key(name) || renamed.contains(name) {
                continue;
            }
            self.plan.push(
                Category::DropColumn,
                &table.name,
                format!("Drop column {}.{name}", table.name),
                self.dialect.drop_column(self.ctx, &table.name, name),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect, SqliteDialect};
    use crate::schema::{ForeignKeyRule, IndexType, View};

    fn my() -> SqlContext<'static> {
        SqlContext::new(&MySqlDialect, "")
    }

    fn clubs() -> Table {
        Table::new("clubs")
            .column(Column::new("id", "INT UNSIGNED").auto_increment())
            .column(Column::new("name", "VARCHAR(200)"))
            .primary_key(["id"])
    }

    fn schema(tables: Vec<Table>) -> Schema {
        tables
            .into_iter()
            .fold(Schema::new("league"), Schema::table)
    }

    #[test]
    fn creates_missing_table() {
        let plan = plan(
            &my(),
            &schema(vec![clubs()]),
            &Schema::new("live"),
            &SyncActions::default(),
        )
        .unwrap();
        assert_eq!(plan.statements.len(), 1);
        let create = &plan.statements[0];
        assert_eq!(create.category, Category::AddTable);
        assert_eq!(create.heading, "Create table clubs");
        let id = create.sql.find("`id` INT UNSIGNED").unwrap();
        let name = create.sql.find("`name` VARCHAR(200)").unwrap();
        let pk = create.sql.find("PRIMARY KEY (`id`)").unwrap();
        assert!(id < name && name < pk, "{}", create.sql);
    }

    #[test]
    fn identical_schemas_need_nothing() {
        let declared = schema(vec![clubs().index(Index::new(
            "clubs_name_uniq",
            IndexType::Unique,
            ["name"],
        ))]);
        let plan = plan(&my(), &declared, &declared, &SyncActions::all()).unwrap();
        assert!(plan.is_empty(), "{:?}", plan.sql());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn widened_column_is_modified_once() {
        let mut live = clubs();
        live.add_column(Column::new("name", "varchar(100)"));
        let plan = plan(
            &my(),
            &schema(vec![clubs()]),
            &schema(vec![live]),
            &SyncActions::default(),
        )
        .unwrap();
        assert_eq!(plan.statements.len(), 1, "{:?}", plan.sql());
        let modify = &plan.statements[0];
        assert_eq!(modify.category, Category::AlterColumn);
        assert_eq!(modify.heading, "Modify column clubs.name (type)");
        assert_eq!(
            modify.sql,
            "ALTER TABLE `clubs` MODIFY COLUMN `name` VARCHAR(200) NOT NULL"
        );
    }

    #[test]
    fn heading_lists_every_difference() {
        let mut live = clubs();
        live.add_column(
            Column::new("name", "TEXT")
                .nullable(true)
                .default_value(DefaultValue::String(String::from("x"))),
        );
        let plan = plan(
            &my(),
            &schema(vec![clubs()]),
            &schema(vec![live]),
            &SyncActions::default(),
        )
        .unwrap();
        assert_eq!(
            plan.statements[0].heading,
            "Modify column clubs.name (type, null, default)"
        );
    }

    #[test]
    fn renamed_table_is_renamed_not_created() {
        let declared = schema(vec![Table::new("teams")
            .column(Column::new("id", "INT UNSIGNED").auto_increment())
            .primary_key(["id"])
            .previous_names(["groups"])]);
        let live = schema(vec![Table::new("groups")
            .column(Column::new("id", "INT UNSIGNED").auto_increment())
            .primary_key(["id"])]);
        let plan = plan(&my(), &declared, &live, &SyncActions::all()).unwrap();
        assert_eq!(plan.sql(), ["RENAME TABLE `groups` TO `teams`"]);
    }

    #[test]
    fn renamed_column_and_positioned_add() {
        let declared = schema(vec![clubs()
            .column(Column::new("city", "VARCHAR(50)").previous_names(["town"]))
            .column(Column::new("founded", "INT").nullable(true))]);
        let live = schema(vec![clubs().column(Column::new("town", "VARCHAR(50)"))]);
        let plan = plan(&my(), &declared, &live, &SyncActions::all()).unwrap();
        assert_eq!(
            plan.sql(),
            [
                "ALTER TABLE `clubs` CHANGE COLUMN `town` `city` VARCHAR(50) NOT NULL",
                "ALTER TABLE `clubs` ADD COLUMN `founded` INT NULL AFTER `city`",
            ]
        );
        // the renamed column is not dropped by the removal pass
        assert!(plan.in_category(Category::DropColumn).next().is_none());
    }

    #[test]
    fn index_type_change_drops_then_adds() {
        let declared = schema(vec![clubs().index(Index::new(
            "clubs_name_uniq",
            IndexType::Unique,
            ["name"],
        ))]);
        let live = schema(vec![clubs().index(Index::new(
            "clubs_name_idx",
            IndexType::Index,
            ["name"],
        ))]);
        let plan = plan(&my(), &declared, &live, &SyncActions::all()).unwrap();
        assert_eq!(
            plan.sql(),
            [
                "ALTER TABLE `clubs` DROP INDEX `clubs_name_idx`",
                "ALTER TABLE `clubs` ADD UNIQUE INDEX `clubs_name_uniq` (`name`)",
            ]
        );
    }

    #[test]
    fn removal_is_gated() {
        let declared = schema(vec![clubs()]);
        let live = schema(vec![clubs()
            .column(Column::new("legacy", "INT"))
            .index(Index::new("clubs_legacy_idx", IndexType::Index, ["legacy"]))]);

        let kept = plan(&my(), &declared, &live, &SyncActions::default()).unwrap();
        assert!(kept.is_empty());

        let removed = plan(&my(), &declared, &live, &SyncActions::all()).unwrap();
        assert_eq!(
            removed.sql(),
            [
                "ALTER TABLE `clubs` DROP INDEX `clubs_legacy_idx`",
                "ALTER TABLE `clubs` DROP COLUMN `legacy`",
            ]
        );
    }

    fn players(fk: ForeignKey) -> Table {
        Table::new("players")
            .column(Column::new("id", "INT UNSIGNED").auto_increment())
            .column(Column::new("club_id", "INT UNSIGNED").nullable(true))
            .primary_key(["id"])
            .index(Index::new("players_club_id_idx", IndexType::Index, ["club_id"]))
            .foreign_key(fk)
    }

    #[test]
    fn missing_foreign_key_gets_preflight() {
        let fk = ForeignKey::new("players", "club_id", "clubs", "id")
            .rules(ForeignKeyRule::Cascade, ForeignKeyRule::SetNull);
        let declared = schema(vec![clubs(), players(fk)]);
        let mut live_players = players(ForeignKey::new("players", "club_id", "clubs", "id"));
        live_players.foreign_keys.clear();
        let live = schema(vec![clubs(), live_players]);

        let plan = plan(&my(), &declared, &live, &SyncActions::default()).unwrap();
        assert_eq!(plan.statements.len(), 1);
        assert_eq!(plan.statements[0].category, Category::AddForeignKey);
        assert_eq!(plan.foreign_key_checks.len(), 1);
        assert_eq!(plan.foreign_key_checks[0].constraint, "fk_players_club_id");
    }

    #[test]
    fn duplicate_foreign_keys_become_fixes() {
        let fk = ForeignKey::new("players", "club_id", "clubs", "id");
        let declared = schema(vec![clubs(), players(fk.clone())]);
        let live = schema(vec![
            clubs(),
            players(fk.clone().named("players_ibfk_1")).foreign_key(fk.named("players_ibfk_2")),
        ]);
        let plan = plan(&my(), &declared, &live, &SyncActions::all()).unwrap();
        assert!(plan.is_empty(), "{:?}", plan.sql());
        assert_eq!(
            plan.warnings,
            [SyncWarning::DuplicateForeignKeys {
                table: String::from("players"),
                constraint: String::from("fk_players_club_id"),
                duplicates: vec![String::from("players_ibfk_2")],
            }]
        );
        let fixes = &plan.fixes["fk_players_club_id"];
        assert_eq!(fixes.len(), 1);
        assert_eq!(
            fixes[0].sql,
            "ALTER TABLE `players` DROP FOREIGN KEY `players_ibfk_2`"
        );
    }

    #[test]
    fn new_table_foreign_keys_follow_creation() {
        let fk = ForeignKey::new("players", "club_id", "clubs", "id");
        let declared = schema(vec![players(fk), clubs()]);
        let ctx = SqlContext::new(&PostgresDialect, "");
        let plan = plan(&ctx, &declared, &Schema::new("live"), &SyncActions::default()).unwrap();
        let categories: Vec<Category> = plan.statements.iter().map(|s| s.category).collect();
        // players CREATE + its index, clubs CREATE, then the constraint
        assert_eq!(
            categories,
            [
                Category::AddTable,
                Category::AddTable,
                Category::AddTable,
                Category::AddForeignKey
            ]
        );
        assert!(plan.foreign_key_checks.is_empty());
    }

    #[test]
    fn sqlite_capability_gaps_warn() {
        let ctx = SqlContext::new(&SqliteDialect, "");
        let mut live = clubs();
        live.add_column(Column::new("name", "VARCHAR(100)"));
        live.set_primary_key(vec![String::from("name")]);
        let plan = plan(
            &ctx,
            &schema(vec![clubs()]),
            &schema(vec![live]),
            &SyncActions::default(),
        )
        .unwrap();
        assert!(plan.is_empty(), "{:?}", plan.sql());
        assert_eq!(plan.warnings.len(), 2);
        assert!(plan.warnings.iter().all(|w| matches!(w, SyncWarning::Unsupported { .. })));
    }

    #[test]
    fn postgres_primary_key_uses_the_live_constraint_name() {
        let ctx = SqlContext::new(&PostgresDialect, "");
        let mut live = clubs();
        live.set_primary_key(vec![String::from("name")]);
        live.primary_key_name = Some(String::from("clubs_legacy_pk"));
        let plan = plan(
            &ctx,
            &schema(vec![clubs()]),
            &schema(vec![live]),
            &SyncActions::default(),
        )
        .unwrap();
        let alter: Vec<_> = plan.in_category(Category::AlterPrimaryKey).collect();
        assert_eq!(alter.len(), 1, "{:?}", plan.sql());
        assert_eq!(
            alter[0].sql,
            "ALTER TABLE \"clubs\" DROP CONSTRAINT \"clubs_legacy_pk\", ADD PRIMARY KEY (\"id\")"
        );
    }

    #[test]
    fn default_records_resolve_functions() {
        let mut record = Record::new();
        record.insert(String::from("name"), String::from("Ajax"));
        record.insert(String::from("token"), String::from("uuid()"));
        let declared = schema(vec![clubs()
            .column(Column::new("token", "CHAR(36)"))
            .record(record)]);
        let plan = plan(&my(), &declared, &Schema::new("live"), &SyncActions::default()).unwrap();
        let insert = plan.in_category(Category::InsertRecord).next().unwrap();
        assert!(insert
            .sql
            .starts_with("INSERT INTO `clubs` (`name`, `token`) VALUES ('Ajax', '"));
        assert!(!insert.sql.contains("uuid()"));
    }

    #[test]
    fn views_are_always_recreated() {
        let declared = schema(vec![clubs()]).view(View::new("club_names", "SELECT name FROM clubs"));
        let plan = plan(&my(), &declared, &declared, &SyncActions::default()).unwrap();
        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements[0].sql.starts_with("DROP VIEW IF EXISTS"));
        assert!(plan.statements[1].sql.starts_with("CREATE VIEW"));

        let mut no_views = SyncActions::default();
        no_views.views = false;
        assert!(plan_is_empty(&declared, &no_views));
    }

    fn plan_is_empty(declared: &Schema, actions: &SyncActions) -> bool {
        plan(&my(), declared, declared, actions).unwrap().is_empty()
    }

    #[test]
    fn prefixed_names() {
        let ctx = SqlContext::new(&MySqlDialect, "app_");
        let declared = schema(vec![clubs().index(Index::new(
            "clubs_name_idx",
            IndexType::Index,
            ["name"],
        ))]);
        let plan = plan(&ctx, &declared, &schema(vec![clubs()]), &SyncActions::default()).unwrap();
        assert_eq!(
            plan.sql(),
            ["ALTER TABLE `app_clubs` ADD INDEX `app_clubs_name_idx` (`name`)"]
        );
    }
}
