//! Schema synchronization planning.
//!
//! [`plan`] compares a declared [`Schema`](crate::schema::Schema) with a
//! live one (as reconstructed by introspection) and returns the DDL that
//! converges the live side, grouped into [`Category`] buckets that run in
//! a fixed order. Planning is pure: it never touches a connection. The
//! driver crate introspects, runs the foreign key pre-flight counts and
//! executes the plan.

mod log;
mod planner;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use log::{LogEntry, LogKind, MigrationLog};
pub use planner::plan;

use crate::condition::{col, Condition};
use crate::dialect::SqlContext;
use crate::error::BuildError;
use crate::query::{Delete, Query, Update};
use crate::schema::ForeignKey;
use crate::value::SqlValue;

/// Toggles gating which kinds of change a sync may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SyncActions {
    /// Create (or rename) missing tables.
    pub create: bool,
    /// Engine, charset and collation (MySQL).
    pub table_attributes: bool,
    /// Primary keys.
    pub primary_key: bool,
    /// Add, rename and modify columns.
    pub column: bool,
    /// Add and replace indexes.
    pub index: bool,
    /// Add foreign keys.
    pub foreign_key: bool,
    /// Drop columns, indexes and foreign keys that are not declared.
    pub remove: bool,
    /// Recreate views.
    pub views: bool,
}

impl Default for SyncActions {
    fn default() -> Self {
        Self {
            remove: false,
            ..Self::all()
        }
    }
}

impl SyncActions {
    /// Every toggle on, including `remove`.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            create: true,
            table_attributes: true,
            primary_key: true,
            column: true,
            index: true,
            foreign_key: true,
            remove: true,
            views: true,
        }
    }
}

/// DDL category. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AlterTable,
    AlterColumn,
    RenameTable,
    RenameColumn,
    DropForeignKey,
    DropIndex,
    DropColumn,
    AddTable,
    InsertRecord,
    AddColumn,
    AddIndex,
    AlterPrimaryKey,
    AddForeignKey,
    Views,
}

impl Category {
    /// Section title used in the migration log.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::AlterTable => "Alter tables",
            Self::AlterColumn => "Alter columns",
            Self::RenameTable => "Rename tables",
            Self::RenameColumn => "Rename columns",
            Self::DropForeignKey => "Drop foreign keys",
            Self::DropIndex => "Drop indexes",
            Self::DropColumn => "Drop columns",
            Self::AddTable => "Add tables",
            Self::InsertRecord => "Insert default records",
            Self::AddColumn => "Add columns",
            Self::AddIndex => "Add indexes",
            Self::AlterPrimaryKey => "Alter primary keys",
            Self::AddForeignKey => "Add foreign keys",
            Self::Views => "Views",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One DDL statement of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStatement {
    /// Category the statement runs in.
    pub category: Category,
    /// Table (or view) the statement touches.
    pub table: String,
    /// Human-readable description.
    pub heading: String,
    /// SQL text.
    pub sql: String,
}

// ============================================================================
// Warnings and fixes
// ============================================================================

/// Something the planner refused to do automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// Rows reference parents that do not exist; adding the constraint
    /// will likely fail until they are fixed.
    OrphanedRows {
        /// Physical constraint name.
        constraint: String,
        /// Table holding the orphans.
        table: String,
        /// Number of orphaned rows.
        rows: i64,
    },
    /// More than one live constraint matches a declared foreign key.
    DuplicateForeignKeys {
        /// Table.
        table: String,
        /// Declared constraint name.
        constraint: String,
        /// Live constraints beyond the first match.
        duplicates: Vec<String>,
    },
    /// The engine cannot perform this change in place.
    Unsupported {
        /// Table.
        table: String,
        /// What would have been done.
        change: String,
    },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedRows {
                constraint,
                table,
                rows,
            } => write!(
                f,
                "{rows} row(s) in {table} violate foreign key {constraint}; see the fixes"
            ),
            Self::DuplicateForeignKeys {
                table,
                constraint,
                duplicates,
            } => write!(
                f,
                "foreign key {constraint} on {table} exists more than once: {}",
                duplicates.join(", ")
            ),
            Self::Unsupported { table, change } => {
                write!(f, "cannot {change} on {table}: unsupported by this engine")
            }
        }
    }
}

/// What a fix query does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    /// Lists orphaned rows.
    Find,
    /// Deletes orphaned rows.
    Delete,
    /// Sets the orphaned references to NULL.
    Nullify,
    /// Drops a duplicate constraint.
    DropDuplicate,
}

/// A statement suggested to the operator. Never executed by the sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// What the statement does.
    pub kind: FixKind,
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<SqlValue>,
}

/// Orphan pre-flight for a foreign key about to be added. The driver runs
/// [`count_query`](Self::count_query) and, when it is non-zero, records a
/// warning with [`fixes`](Self::fixes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyCheck {
    /// Physical constraint name; fixes are keyed by it.
    pub constraint: String,
    /// The declared foreign key.
    pub foreign_key: ForeignKey,
}

/// Alias of the parent table in orphan queries.
const PARENT_ALIAS: &str = "fk_parent";

impl ForeignKeyCheck {
    /// Creates a check for `foreign_key`.
    #[must_use]
    pub fn new(ctx: &SqlContext<'_>, foreign_key: &ForeignKey) -> Self {
        Self {
            constraint: ctx.physical(&foreign_key.constraint_name()),
            foreign_key: foreign_key.clone(),
        }
    }

    fn child_field(&self) -> String {
        format!("{}.{}", self.foreign_key.table, self.foreign_key.column)
    }

    /// Rows of the child table whose reference has no parent.
    #[must_use]
    pub fn find_query(&self) -> Query {
        let fk = &self.foreign_key;
        let parent = format!("{PARENT_ALIAS}.{}", fk.target_column);
        Query::from(&fk.table)
            .left_join_as(
                &fk.target_table,
                PARENT_ALIAS,
                Condition::columns_eq(&self.child_field(), &parent),
            )
            .where_(col(&self.child_field()).is_not_null().and(col(&parent).is_null()))
    }

    /// `SELECT COUNT(*)` over [`find_query`](Self::find_query).
    #[must_use]
    pub fn count_query(&self) -> Query {
        self.find_query().count_query()
    }

    fn orphan_filter(&self) -> Condition {
        let fk = &self.foreign_key;
        col(&fk.column).is_not_null().and(
            col(&fk.column)
                .not_in_query(Query::from(&fk.target_table).select([fk.target_column.as_str()])),
        )
    }

    /// Renders the find, delete and null-out fixes.
    pub fn fixes(&self, ctx: &SqlContext<'_>) -> Result<Vec<Fix>, BuildError> {
        let fk = &self.foreign_key;
        let (find, find_params) = self.find_query().build(ctx)?;
        let (delete, delete_params) = Delete::from(&fk.table)
            .where_(self.orphan_filter())
            .build(ctx)?;
        let (nullify, nullify_params) = Update::table(&fk.table)
            .set(&fk.column, SqlValue::Null)
            .where_(self.orphan_filter())
            .build(ctx)?;
        Ok(vec![
            Fix {
                kind: FixKind::Find,
                sql: find,
                params: find_params,
            },
            Fix {
                kind: FixKind::Delete,
                sql: delete,
                params: delete_params,
            },
            Fix {
                kind: FixKind::Nullify,
                sql: nullify,
                params: nullify_params,
            },
        ])
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Result of [`plan`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    /// Statements, sorted by category and in table declaration order
    /// within a category.
    pub statements: Vec<PlannedStatement>,
    /// Orphan pre-flights for foreign keys added to existing tables.
    pub foreign_key_checks: Vec<ForeignKeyCheck>,
    /// Changes that were not planned.
    pub warnings: Vec<SyncWarning>,
    /// Suggested manual fixes keyed by constraint name.
    pub fixes: IndexMap<String, Vec<Fix>>,
}

impl SyncPlan {
    /// Returns `true` if there is nothing to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements of one category.
    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &PlannedStatement> {
        self.statements
            .iter()
            .filter(move |s| s.category == category)
    }

    /// Statements grouped by category, in execution order.
    pub fn sections(&self) -> impl Iterator<Item = (Category, &[PlannedStatement])> {
        self.statements
            .chunk_by(|a, b| a.category == b.category)
            .map(|chunk| (chunk[0].category, chunk))
    }

    /// SQL text in execution order.
    #[must_use]
    pub fn sql(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.sql.as_str()).collect()
    }

    pub(crate) fn push(
        &mut self,
        category: Category,
        table: &str,
        heading: impl Into<String>,
        sql: String,
    ) {
        self.statements.push(PlannedStatement {
            category,
            table: table.to_string(),
            heading: heading.into(),
            sql,
        });
    }

    pub(crate) fn finish(mut self) -> Self {
        // stable: table declaration order survives within a category
        self.statements.sort_by_key(|s| s.category);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, SqliteDialect};

    #[test]
    fn default_actions_never_remove() {
        let actions = SyncActions::default();
        assert!(!actions.remove);
        assert!(actions.create && actions.views && actions.foreign_key);
        assert!(SyncActions::all().remove);
        let parsed: SyncActions = serde_json::from_str(r#"{"views": false}"#).unwrap();
        assert!(!parsed.views);
        assert!(parsed.create);
    }

    #[test]
    fn categories_sort_in_execution_order() {
        assert!(Category::AlterTable < Category::AlterColumn);
        assert!(Category::DropColumn < Category::AddTable);
        assert!(Category::AddIndex < Category::AlterPrimaryKey);
        assert!(Category::AddForeignKey < Category::Views);
    }

    #[test]
    fn orphan_queries() {
        let ctx = SqlContext::new(&MySqlDialect, "");
        let check = ForeignKeyCheck::new(&ctx, &ForeignKey::new("players", "club_id", "clubs", "id"));
        assert_eq!(check.constraint, "fk_players_club_id");

        let (count, params) = check.count_query().build(&ctx).unwrap();
        assert!(params.is_empty());
        assert_eq!(
            count,
            "SELECT COUNT(*) FROM (SELECT `players`.* FROM `players` \
             LEFT JOIN `clubs` AS `fk_parent` ON `players`.`club_id` = `fk_parent`.`id` \
             WHERE `players`.`club_id` IS NOT NULL AND `fk_parent`.`id` IS NULL) AS `sub`"
        );

        let fixes = check.fixes(&ctx).unwrap();
        assert_eq!(
            fixes.iter().map(|f| f.kind).collect::<Vec<_>>(),
            [FixKind::Find, FixKind::Delete, FixKind::Nullify]
        );
        assert_eq!(
            fixes[1].sql,
            "DELETE FROM `players` WHERE `club_id` IS NOT NULL AND `club_id` NOT IN \
             (SELECT `id` FROM `clubs`)"
        );
        assert!(fixes[2].sql.starts_with("UPDATE `players` SET `club_id` = ? WHERE"));
        assert_eq!(fixes[2].params, vec![SqlValue::Null]);
    }

    #[test]
    fn orphan_queries_with_prefix() {
        let ctx = SqlContext::new(&SqliteDialect, "app_");
        let check = ForeignKeyCheck::new(&ctx, &ForeignKey::new("players", "club_id", "clubs", "id"));
        assert_eq!(check.constraint, "app_fk_players_club_id");
        let (sql, _) = check.find_query().build(&ctx).unwrap();
        assert!(sql.contains("FROM \"app_players\" AS \"players\""), "{sql}");
        assert!(sql.contains("LEFT JOIN \"app_clubs\" AS \"fk_parent\""), "{sql}");
    }

    #[test]
    fn sections_group_sorted_statements() {
        let mut plan = SyncPlan::default();
        plan.push(Category::AddIndex, "a", "i1", String::from("I1"));
        plan.push(Category::AddTable, "b", "t1", String::from("T1"));
        plan.push(Category::AddIndex, "b", "i2", String::from("I2"));
        let plan = plan.finish();
        assert_eq!(plan.sql(), ["T1", "I1", "I2"]);
        let sections: Vec<_> = plan.sections().map(|(c, s)| (c, s.len())).collect();
        assert_eq!(sections, [(Category::AddTable, 1), (Category::AddIndex, 2)]);
    }
}
