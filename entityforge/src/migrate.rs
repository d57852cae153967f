//! Changeset to `ALTER TABLE` statements.
//!
//! A changeset becomes at most three statements, executed in this order and
//! only when non-empty:
//!
//! 1. add: `ADD COLUMN <ddl>` per added component;
//! 2. drop: `DROP COLUMN <name>` per removed component;
//! 3. alter: per modified component, retype with a cast, then set or drop the
//!    default, then set or drop `NOT NULL`.
//!
//! The per-column order in the alter statement matters: the type changes
//! before the default and nullability are adjusted.
//!
//! Statements run independently. A failure stops the remaining phases but the
//! phases that already ran stay applied; nothing is compensated.

use std::fmt;

use sea_orm::{ConnectionTrait, DbErr};
use thiserror::Error;

use crate::component::DataComponent;
use crate::diff::ComponentChangeset;
use crate::error::Result;
use crate::ident;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    AddColumns,
    DropColumns,
    AlterColumns,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::AddColumns => f.write_str("add columns"),
            MigrationPhase::DropColumns => f.write_str("drop columns"),
            MigrationPhase::AlterColumns => f.write_str("alter columns"),
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to {phase} on {table}: {source}")]
pub struct MigrationError {
    pub phase: MigrationPhase,
    pub table: String,
    pub statement: String,
    /// Phases that completed before the failure and were left applied.
    pub applied: Vec<MigrationPhase>,
    #[source]
    pub source: DbErr,
}

/// The statements a changeset turns into, before execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub table: String,
    pub add: Option<String>,
    pub drop: Option<String>,
    pub alter: Option<String>,
}

impl MigrationPlan {
    pub fn from_changeset(changeset: &ComponentChangeset, table: &str) -> Self {
        let add: Vec<String> = changeset
            .added
            .iter()
            .map(|c| format!("ADD COLUMN {}", c.column_ddl()))
            .collect();

        let drop: Vec<String> = changeset
            .removed
            .iter()
            .map(|c| format!("DROP COLUMN {}", c.name))
            .collect();

        let alter: Vec<String> = changeset.modified.iter().flat_map(alter_clauses).collect();

        Self {
            table: table.to_string(),
            add: statement(table, add),
            drop: statement(table, drop),
            alter: statement(table, alter),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_none() && self.drop.is_none() && self.alter.is_none()
    }

    /// Non-empty statements in execution order.
    pub fn statements(&self) -> impl Iterator<Item = (MigrationPhase, &str)> {
        [
            (MigrationPhase::AddColumns, &self.add),
            (MigrationPhase::DropColumns, &self.drop),
            (MigrationPhase::AlterColumns, &self.alter),
        ]
        .into_iter()
        .filter_map(|(phase, sql)| sql.as_deref().map(|sql| (phase, sql)))
    }

    /// Run the plan. Returns the phases that were executed.
    pub async fn execute(&self, db: &impl ConnectionTrait) -> Result<Vec<MigrationPhase>, MigrationError> {
        let mut applied = Vec::new();
        for (phase, sql) in self.statements() {
            log::debug!("migrating {} ({phase}): {sql}", self.table);
            if let Err(source) = db.execute_unprepared(sql).await {
                log::error!(
                    "migration of {} failed during {phase}; already applied: {applied:?}",
                    self.table
                );
                return Err(MigrationError {
                    phase,
                    table: self.table.clone(),
                    statement: sql.to_string(),
                    applied,
                    source,
                });
            }
            applied.push(phase);
        }
        Ok(applied)
    }
}

fn alter_clauses(component: &DataComponent) -> [String; 3] {
    let name = &component.name;
    let column_type = &component.column_type;
    let default = match component.settings.default_literal() {
        Some(literal) => format!("ALTER COLUMN {name} SET DEFAULT {literal}"),
        None => format!("ALTER COLUMN {name} DROP DEFAULT"),
    };
    let nullability = if component.mandatory {
        format!("ALTER COLUMN {name} SET NOT NULL")
    } else {
        format!("ALTER COLUMN {name} DROP NOT NULL")
    };
    [
        format!("ALTER COLUMN {name} TYPE {column_type} USING {name}::{column_type}"),
        default,
        nullability,
    ]
}

fn statement(table: &str, clauses: Vec<String>) -> Option<String> {
    if clauses.is_empty() {
        return None;
    }
    Some(format!("ALTER TABLE IF EXISTS {table} {}", clauses.join(", ")))
}

/// Build and execute the migration for `changeset` against `table`.
pub async fn update_table_from_changeset(
    db: &impl ConnectionTrait,
    changeset: &ComponentChangeset,
    table: &str,
) -> Result<Vec<MigrationPhase>> {
    ident::validate_identifier("table", table)?;
    for component in changeset
        .added
        .iter()
        .chain(&changeset.removed)
        .chain(&changeset.modified)
    {
        ident::validate_column_name("components.name", &component.name)?;
    }
    for component in changeset.added.iter().chain(&changeset.modified) {
        component.validate_settings()?;
    }
    let plan = MigrationPlan::from_changeset(changeset, table);
    if plan.is_empty() {
        log::debug!("no schema changes for {table}");
        return Ok(Vec::new());
    }
    let applied = plan.execute(db).await?;
    log::info!("migrated {table}: {applied:?}");
    Ok(applied)
}
