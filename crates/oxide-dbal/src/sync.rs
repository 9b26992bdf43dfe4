//! Schema synchronization against a live connection.
//!
//! The [`Synchronizer`] introspects the tables a declared schema mentions,
//! plans the converging DDL, counts orphaned rows for every foreign key it
//! is about to add, and then replays the plan. A failing statement is
//! logged and recorded but does not stop the statements after it.

use std::time::Duration;

use indexmap::IndexMap;
use oxide_dbal_core::schema::Schema;
use oxide_dbal_core::sync::{plan, Fix, MigrationLog, SyncActions, SyncPlan, SyncWarning};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::fetch::Fetch;
use crate::error::Result;

/// Outcome of executing (or dry-running) a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Ordered log of what was, or would have been, done.
    pub log: MigrationLog,
    /// Planner and pre-flight warnings.
    pub warnings: Vec<SyncWarning>,
    /// Suggested fixes keyed by constraint name.
    pub fixes: IndexMap<String, Vec<Fix>>,
    /// Messages of the statements that failed.
    pub errors: Vec<String>,
    /// Statements that ran successfully.
    pub executed: usize,
}

impl SyncReport {
    /// Returns `true` if no statement failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Converges a connection's schema to a declared one.
#[derive(Debug)]
pub struct Synchronizer<'c> {
    conn: &'c Connection,
    actions: SyncActions,
}

impl<'c> Synchronizer<'c> {
    /// Creates a synchronizer with the default toggles (no removals).
    #[must_use]
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            actions: SyncActions::default(),
        }
    }

    /// Sets the toggles.
    #[must_use]
    pub const fn actions(mut self, actions: SyncActions) -> Self {
        self.actions = actions;
        self
    }

    /// Introspects, plans and runs the foreign key pre-flight.
    pub async fn plan(&self, declared: &Schema) -> Result<SyncPlan> {
        let names: Vec<String> = declared
            .tables
            .values()
            .flat_map(|t| std::iter::once(t.name.clone()).chain(t.previous_names.iter().cloned()))
            .collect();
        let live = self.conn.live_schema(&names).await?;
        let mut planned = plan(&self.conn.ctx(), declared, &live, &self.actions)?;
        info!(
            statements = planned.statements.len(),
            checks = planned.foreign_key_checks.len(),
            "Sync planned"
        );
        self.check_foreign_key_matches(&mut planned).await?;
        Ok(planned)
    }

    /// Counts orphaned rows for every foreign key the plan adds. Keys with
    /// orphans get a warning and find/delete/null-out fixes; the key is
    /// still added.
    pub async fn check_foreign_key_matches(&self, planned: &mut SyncPlan) -> Result<()> {
        let ctx = self.conn.ctx();
        for check in &planned.foreign_key_checks {
            let fk = &check.foreign_key;
            if !self.conn.table_exists(&fk.target_table).await? {
                debug!(constraint = %check.constraint, "Parent table not created yet, skipping orphan count");
                continue;
            }
            let rows = check.find_query().count(&self.conn).await?;
            if rows == 0 {
                continue;
            }
            warn!(constraint = %check.constraint, rows, "Orphaned rows found");
            planned.warnings.push(SyncWarning::OrphanedRows {
                constraint: check.constraint.clone(),
                table: fk.table.clone(),
                rows,
            });
            planned
                .fixes
                .insert(check.constraint.clone(), check.fixes(&ctx)?);
        }
        Ok(())
    }

    /// Replays `planned`. With `act` false nothing is executed but the log
    /// is the same.
    pub async fn execute(&self, planned: &SyncPlan, act: bool) -> SyncReport {
        let mut report = SyncReport {
            warnings: planned.warnings.clone(),
            fixes: planned.fixes.clone(),
            ..SyncReport::default()
        };
        if !act {
            info!("Dry run - SQL will be logged but not executed");
        }

        for (category, statements) in planned.sections() {
            report.log.section(category.title());
            for statement in statements {
                report.log.heading(&statement.heading);
                report.log.query(&statement.sql);
                if !act {
                    continue;
                }
                match self.conn.execute_raw(&statement.sql).await {
                    Ok(_) => report.executed += 1,
                    Err(err) => {
                        warn!(heading = %statement.heading, error = %err, "Statement failed");
                        report.log.message(format!("Failed: {err}"));
                        report.errors.push(err.to_string());
                    }
                }
            }
        }

        for warning in &report.warnings {
            report.log.message(format!("Warning: {warning}"));
        }
        for (constraint, fixes) in &report.fixes {
            for fix in fixes {
                report
                    .log
                    .message(format!("Fix for {constraint} ({:?}): {}", fix.kind, fix.sql));
            }
        }
        if !report.errors.is_empty() {
            report
                .log
                .message(format!("{} statement(s) failed:", report.errors.len()));
            for err in &report.errors {
                report.log.message(err.clone());
            }
        }
        info!(
            executed = report.executed,
            failed = report.errors.len(),
            "Sync finished"
        );
        report
    }

    /// Plans and executes in one go.
    pub async fn migrate(&self, declared: &Schema, act: bool) -> Result<SyncReport> {
        let planned = self.plan(declared).await?;
        Ok(self.execute(&planned, act).await)
    }

    /// [`migrate`](Self::migrate) under the advisory lock `name`, so
    /// concurrent runs against one database serialize.
    pub async fn with_lock(
        &self,
        name: &str,
        timeout: Duration,
        declared: &Schema,
        act: bool,
    ) -> Result<SyncReport> {
        self.conn
            .with_lock(name, timeout, || self.migrate(declared, act))
            .await
    }
}
