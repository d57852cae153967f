//! Table synthesis: entity definition in, `CREATE TABLE` out.

use std::fmt;

use sea_orm::{ConnectionTrait, DbErr};
use thiserror::Error;

use crate::artifacts::SchemaArtifacts;
use crate::definition::EntityDefinition;
use crate::error::{ForgeError, Result};

/// Columns every entity table starts with, ahead of the layout columns.
pub const FIXED_COLUMN_DDL: [&str; 4] = [
    "id UUID PRIMARY KEY DEFAULT gen_random_uuid()",
    "entity_id UUID NOT NULL UNIQUE REFERENCES entities(id) ON DELETE CASCADE",
    "created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()",
    "updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPhase {
    Execute,
    PersistArtifact,
}

impl fmt::Display for SynthesisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisPhase::Execute => f.write_str("executing DDL"),
            SynthesisPhase::PersistArtifact => f.write_str("persisting schema artifact"),
        }
    }
}

/// A synthesis failure after the DDL was generated.
///
/// `ddl` is the statement that was generated, kept for diagnostics only.
#[derive(Error, Debug)]
#[error("synthesis of table {table} failed while {phase}: {source}")]
pub struct SynthesisError {
    pub phase: SynthesisPhase,
    pub table: String,
    pub ddl: String,
    #[source]
    pub source: Box<ForgeError>,
}

/// The full `CREATE TABLE IF NOT EXISTS` statement for a definition.
///
/// Pure text generation. Identifiers are spliced in as-is, so callers must run
/// [`EntityDefinition::validate_shape`] first; [`create_entity_table`] does.
pub fn create_table_sql(definition: &EntityDefinition) -> String {
    let columns: Vec<String> = FIXED_COLUMN_DDL
        .iter()
        .map(|c| c.to_string())
        .chain(definition.components().iter().map(|c| c.column_ddl()))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        definition.table_name(),
        columns.join(", ")
    )
}

/// Create the entity table and write its schema artifact. Returns the table name.
///
/// Safe to repeat: the statement is `IF NOT EXISTS` and the artifact is
/// overwritten. When execution fails nothing is written.
pub async fn create_entity_table(
    db: &impl ConnectionTrait,
    artifacts: &SchemaArtifacts,
    definition: &EntityDefinition,
) -> Result<String> {
    definition.validate_shape()?;

    let table = definition.table_name();
    let ddl = create_table_sql(definition);

    if let Err(e) = db.execute_unprepared(&ddl).await {
        log::error!("failed to create table {table}: {e}");
        return Err(SynthesisError {
            phase: SynthesisPhase::Execute,
            table,
            ddl,
            source: Box::new(e.into()),
        }
        .into());
    }

    if let Err(e) = artifacts.write(&table, &ddl).await {
        log::error!("created table {table} but could not write its schema artifact: {e}");
        return Err(SynthesisError {
            phase: SynthesisPhase::PersistArtifact,
            table,
            ddl,
            source: Box::new(e),
        }
        .into());
    }

    log::info!("synthesized table {table} ({} columns)", definition.components().len());
    Ok(table)
}

/// `DROP TABLE IF EXISTS <table> CASCADE`.
pub async fn drop_entity_table(db: &impl ConnectionTrait, table: &str) -> Result<(), DbErr> {
    crate::ident::validate_identifier("table", table).map_err(|e| DbErr::Custom(e.to_string()))?;
    db.execute_unprepared(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
        .await?;
    log::info!("dropped table {table}");
    Ok(())
}
