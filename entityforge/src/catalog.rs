//! The `entities` catalog table.
//!
//! Every record in an `entity_<id>` table belongs to a row here through its
//! `entity_id` column. Catalog rows carry the entity class, so deleting a
//! definition can clear every catalog entry of that class in one statement;
//! the `ON DELETE CASCADE` on the entity tables takes care of the rest.
//!
//! The table is created by [`EntityForgeBuilder::build()`](crate::EntityForgeBuilder::build)
//! unless the catalog is disabled.
//!
//! A catalog row is created first, with `has_data = false`. Saving data for it
//! inserts the record into the class table and flips the flag. Rows form a tree
//! through `parent_id`, listed page by page with [`children`].

use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DbErr, ExecResult, FromQueryResult, Statement, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationFailure;

pub const CATALOG_TABLE: &str = "entities";

pub const DEFAULT_ENTITY_TYPE: &str = "object";
pub const MAX_KEY_LEN: usize = 255;
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// One row of the `entities` table.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub entity_class: String,
    pub parent_id: Option<Uuid>,
    pub o_key: Option<String>,
    pub o_path: Option<String>,
    pub o_type: String,
    pub published: bool,
    pub has_data: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata for a new catalog row. The class comes from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewCatalogEntry {
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub key: String,
    pub path: String,
    /// Empty means [`DEFAULT_ENTITY_TYPE`].
    #[serde(default, rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub published: bool,
}

impl NewCatalogEntry {
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn under(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationFailure> {
        for (field, value) in [("key", &self.key), ("path", &self.path)] {
            if value.trim().is_empty() {
                return Err(ValidationFailure::MissingField {
                    field: field.to_string(),
                });
            }
        }
        if self.key.chars().count() > MAX_KEY_LEN {
            return Err(ValidationFailure::FieldTooLong {
                field: "key".to_string(),
                max: MAX_KEY_LEN,
            });
        }
        Ok(())
    }

    fn entity_type(&self) -> &str {
        if self.entity_type.is_empty() {
            DEFAULT_ENTITY_TYPE
        } else {
            &self.entity_type
        }
    }
}

/// One page of a parent's children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogPage {
    pub items: Vec<CatalogEntry>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    total: i64,
}

/// Create the `entities` table if it does not already exist.
pub async fn create_catalog_table(db: &impl ConnectionTrait) -> Result<ExecResult, DbErr> {
    db.execute_unprepared(
        "CREATE TABLE IF NOT EXISTS entities (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            entity_class TEXT NOT NULL,
            parent_id UUID REFERENCES entities(id) ON DELETE CASCADE,
            o_key TEXT,
            o_path TEXT,
            o_type TEXT NOT NULL DEFAULT 'object',
            published BOOLEAN NOT NULL DEFAULT FALSE,
            has_data BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .await
}

/// Insert a catalog row of `class_id` without data and return it.
pub async fn create_entity(
    db: &impl ConnectionTrait,
    class_id: &str,
    entry: &NewCatalogEntry,
) -> Result<CatalogEntry, DbErr> {
    let parent: Value = entry.parent_id.into();
    let created = CatalogEntry::find_by_statement(Statement::from_sql_and_values(
        db.get_database_backend(),
        "INSERT INTO entities (entity_class, parent_id, o_key, o_path, o_type, published, has_data)
         VALUES ($1, $2, $3, $4, $5, $6, FALSE) RETURNING *",
        [
            class_id.into(),
            parent,
            entry.key.clone().into(),
            entry.path.clone().into(),
            entry.entity_type().into(),
            entry.published.into(),
        ],
    ))
    .one(db)
    .await?
    .ok_or(DbErr::RecordNotInserted)?;
    log::debug!("created catalog entry {} of class {class_id}", created.id);
    Ok(created)
}

pub async fn get_entity(db: &impl ConnectionTrait, id: Uuid) -> Result<Option<CatalogEntry>, DbErr> {
    CatalogEntry::find_by_statement(Statement::from_sql_and_values(
        db.get_database_backend(),
        "SELECT * FROM entities WHERE id = $1",
        [id.into()],
    ))
    .one(db)
    .await
}

/// Record that the class table now holds data for `id`.
pub async fn mark_has_data(db: &impl ConnectionTrait, id: Uuid) -> Result<u64, DbErr> {
    let result = db
        .execute_raw(Statement::from_sql_and_values(
            db.get_database_backend(),
            "UPDATE entities SET has_data = TRUE, updated_at = NOW() WHERE id = $1",
            [id.into()],
        ))
        .await?;
    Ok(result.rows_affected())
}

/// Delete one catalog row. Its class record goes with it through the cascade.
pub async fn delete_entity(db: &impl ConnectionTrait, id: Uuid) -> Result<u64, DbErr> {
    let result = db
        .execute_raw(Statement::from_sql_and_values(
            db.get_database_backend(),
            "DELETE FROM entities WHERE id = $1",
            [id.into()],
        ))
        .await?;
    Ok(result.rows_affected())
}

pub fn check_page_limit(limit: u64) -> Result<(), ValidationFailure> {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ValidationFailure::InvalidPageLimit {
            limit,
            max: MAX_PAGE_LIMIT,
        });
    }
    Ok(())
}

/// List the direct children of `parent_id`, ordered by key.
///
/// The caller checks `limit` with [`check_page_limit`].
pub async fn children(
    db: &impl ConnectionTrait,
    parent_id: Uuid,
    limit: u64,
    offset: u64,
) -> Result<CatalogPage, DbErr> {
    let backend = db.get_database_backend();
    let items = CatalogEntry::find_by_statement(Statement::from_sql_and_values(
        backend,
        "SELECT * FROM entities WHERE parent_id = $1 ORDER BY o_key, id LIMIT $2 OFFSET $3",
        [parent_id.into(), to_bigint(limit), to_bigint(offset)],
    ))
    .all(db)
    .await?;

    let total = CountRow::find_by_statement(Statement::from_sql_and_values(
        backend,
        "SELECT COUNT(*) AS total FROM entities WHERE parent_id = $1",
        [parent_id.into()],
    ))
    .one(db)
    .await?
    .map_or(0, |row| u64::try_from(row.total).unwrap_or(0));

    Ok(CatalogPage {
        items,
        total,
        limit,
        offset,
        has_more: offset.saturating_add(limit) < total,
    })
}

fn to_bigint(n: u64) -> Value {
    i64::try_from(n).unwrap_or(i64::MAX).into()
}

/// Delete every catalog row of the given class.
///
/// Returns the number of rows removed. Zero is not an error: a class with no
/// stored entities is the common case right after a definition is created.
pub async fn delete_entities_by_class(
    db: &impl ConnectionTrait,
    class_id: &str,
) -> Result<u64, DbErr> {
    let result = db
        .execute_raw(Statement::from_sql_and_values(
            db.get_database_backend(),
            "DELETE FROM entities WHERE entity_class = $1",
            [class_id.into()],
        ))
        .await?;
    log::debug!(
        "removed {} catalog rows of class {class_id}",
        result.rows_affected()
    );
    Ok(result.rows_affected())
}
