//! The schema engine service: connection, stores, adapter registry and the
//! definition pipelines that tie them together.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::adapter::{AdapterRegistry, EntityAdapter, EntityData};
use crate::artifacts::{DEFAULT_SCHEMA_DIR, SchemaArtifacts};
use crate::catalog::{self, CatalogEntry, CatalogPage, NewCatalogEntry};
use crate::components::{self, ComponentTypeDefinition};
use crate::definition::EntityDefinition;
use crate::diff::{self, ComponentChangeset};
use crate::error::{ForgeError, Result, ValidationFailure};
use crate::migrate::{self, MigrationPhase};
use crate::pipeline::{PipelineStep, Progress};
use crate::slug::slugify;
use crate::store::{DEFAULT_DEFINITIONS_DIR, DefinitionStore};
use crate::synth;
use crate::table_adapter::TableAdapter;
use crate::validate;

type IdentityLocks = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Owns everything the definition pipelines and entity dispatch need.
///
/// Create, update and delete of the same definition are serialized through a
/// lock keyed by the slug of the definition id. Different definitions proceed
/// concurrently. A lock lives in the map only while some pipeline holds or
/// waits for it.
pub struct EntityForge {
    db: DatabaseConnection,
    store: DefinitionStore,
    artifacts: SchemaArtifacts,
    adapters: Arc<AdapterRegistry>,
    locks: IdentityLocks,
}

/// Held for the duration of one pipeline. Dropping it releases the identity
/// and removes the map entry once nobody else refers to it.
struct IdentityGuard {
    key: String,
    locks: IdentityLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for EntityForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityForge")
            .field("definitions_dir", &self.store.dir())
            .field("schema_dir", &self.artifacts.dir())
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

impl EntityForge {
    /// Get a reference to the underlying SeaORM connection.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    pub fn artifacts(&self) -> &SchemaArtifacts {
        &self.artifacts
    }

    /// The adapter registry consulted by the entity CRUD calls.
    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    /// Every component kind a definition may use, in declaration order.
    pub fn component_types(&self) -> &'static [ComponentTypeDefinition] {
        components::all_component_types()
    }

    pub async fn validate_new_definition(&self, definition: &EntityDefinition) -> Result<()> {
        let existing = self.store.load_all().await?;
        validate::validate_new_definition(definition, &existing)
    }

    pub fn validate_existing_definition(&self, definition: &EntityDefinition) -> Result<()> {
        validate::validate_existing_definition(definition)
    }

    /// Create the physical table for `definition` and persist its DDL. Returns the table name.
    pub async fn create_entity_table(&self, definition: &EntityDefinition) -> Result<String> {
        synth::create_entity_table(&self.db, &self.artifacts, definition).await
    }

    /// Write the definition document, replacing any earlier version.
    pub async fn store_definition_into_entity_file(
        &self,
        definition: &EntityDefinition,
    ) -> Result<PathBuf> {
        self.store.store(definition).await
    }

    pub async fn load_definition_by_id(&self, id: &str) -> Result<EntityDefinition> {
        self.store.load_by_id(id).await
    }

    pub async fn load_definitions_from_entity_files(&self) -> Result<Vec<EntityDefinition>> {
        self.store.load_all().await
    }

    pub fn compare_definitions(
        &self,
        existing: &EntityDefinition,
        proposed: &EntityDefinition,
    ) -> Result<ComponentChangeset> {
        diff::compare_definitions(existing, proposed)
    }

    pub async fn update_table_from_changeset(
        &self,
        changeset: &ComponentChangeset,
        table: &str,
    ) -> Result<Vec<MigrationPhase>> {
        migrate::update_table_from_changeset(&self.db, changeset, table).await
    }

    /// Validate, create the table, store the document and register a
    /// [`TableAdapter`] for the new class. Returns the table name.
    pub async fn create_definition(&self, definition: EntityDefinition) -> Result<String> {
        let _guard = self.lock_identity(&definition.id).await;
        let mut progress = Progress::new("create", &definition.id);

        let validated = self.validate_new_definition(&definition).await;
        progress.step(PipelineStep::ValidateDefinition, validated)?;

        let created = self.create_entity_table(&definition).await;
        let table = progress.step(PipelineStep::CreateTable, created)?;

        let stored = self.store.store_new(&definition).await;
        progress.step(PipelineStep::StoreDefinition, stored)?;

        let registered = self.register_table_adapter(definition.clone());
        progress.step(PipelineStep::RegisterAdapter, registered)?;

        log::info!("created definition '{}' backed by {table}", definition.id);
        Ok(table)
    }

    /// Replace the stored definition `id` with `definition`, migrating its table.
    ///
    /// Returns the changeset that was applied.
    pub async fn update_definition(
        &self,
        id: &str,
        definition: EntityDefinition,
    ) -> Result<ComponentChangeset> {
        if definition.id != id {
            return Err(ValidationFailure::IdMismatch {
                expected: id.to_string(),
                found: definition.id,
            }
            .into());
        }

        let _guard = self.lock_identity(id).await;
        let mut progress = Progress::new("update", id);

        progress.step(
            PipelineStep::ValidateDefinition,
            self.validate_existing_definition(&definition),
        )?;

        let loaded = self.load_definition_by_id(id).await.and_then(|existing| {
            if existing.id != definition.id {
                return Err(ValidationFailure::IdMismatch {
                    expected: existing.id,
                    found: definition.id.clone(),
                }
                .into());
            }
            Ok(existing)
        });
        let existing = progress.step(PipelineStep::LoadDefinition, loaded)?;

        let changeset = progress.step(
            PipelineStep::CompareDefinitions,
            self.compare_definitions(&existing, &definition),
        )?;

        let table = definition.table_name();
        let migrated = self.update_table_from_changeset(&changeset, &table).await;
        progress.step(PipelineStep::MigrateTable, migrated)?;

        let ddl = synth::create_table_sql(&definition);
        let rewritten = self.artifacts.write(&table, &ddl).await;
        progress.step(PipelineStep::SynthesizeSchema, rewritten)?;

        let stored = self.store_definition_into_entity_file(&definition).await;
        progress.step(PipelineStep::StoreDefinition, stored)?;

        let registered = self.register_table_adapter(definition);
        progress.step(PipelineStep::RegisterAdapter, registered)?;

        log::info!(
            "updated definition '{id}': added {:?}, removed {:?}, modified {:?}",
            changeset.added_names(),
            changeset.removed_names(),
            changeset.modified_names()
        );
        Ok(changeset)
    }

    /// Remove a definition and everything derived from it.
    ///
    /// Steps run in a fixed order: drop the table, delete catalog rows of the
    /// class, delete the schema artifact, delete the document, retire the
    /// adapter.
    pub async fn delete_definition(&self, id: &str) -> Result<()> {
        let _guard = self.lock_identity(id).await;
        let mut progress = Progress::new("delete", id);

        let loaded = self.load_definition_by_id(id).await;
        let definition = progress.step(PipelineStep::LoadDefinition, loaded)?;
        let table = definition.table_name();

        let dropped = synth::drop_entity_table(&self.db, &table)
            .await
            .map_err(ForgeError::from);
        progress.step(PipelineStep::DropTable, dropped)?;

        let cleared = catalog::delete_entities_by_class(&self.db, &definition.id)
            .await
            .map_err(ForgeError::from);
        progress.step(PipelineStep::DeleteCatalogRows, cleared)?;

        let removed = self.artifacts.delete(&table).await;
        progress.step(PipelineStep::DeleteSchemaArtifact, removed)?;

        let removed = self.store.delete(id).await;
        progress.step(PipelineStep::DeleteDefinition, removed)?;

        if self.adapters.unregister(&definition.id).is_none() {
            log::warn!("no adapter was registered for deleted definition '{id}'");
        }
        progress.step(PipelineStep::UnregisterAdapter, Ok(()))?;

        log::info!("deleted definition '{id}' ({:?})", progress.completed());
        Ok(())
    }

    /// Insert a catalog row of class `class_id` with no data yet.
    ///
    /// The class must have a registered adapter.
    pub async fn create_catalog_entry(
        &self,
        class_id: &str,
        entry: NewCatalogEntry,
    ) -> Result<CatalogEntry> {
        self.adapters.get(class_id)?;
        entry.validate()?;
        let created = catalog::create_entity(&self.db, class_id, &entry).await?;
        log::info!("created {class_id} entity {} ({})", created.id, entry.key);
        Ok(created)
    }

    pub async fn catalog_entry(&self, entity_id: Uuid) -> Result<CatalogEntry> {
        catalog::get_entity(&self.db, entity_id)
            .await?
            .ok_or_else(|| ForgeError::RecordNotFound {
                table: catalog::CATALOG_TABLE.to_string(),
                id: entity_id.to_string(),
            })
    }

    /// Delete a catalog row together with its class record.
    pub async fn delete_catalog_entry(&self, entity_id: Uuid) -> Result<()> {
        if catalog::delete_entity(&self.db, entity_id).await? == 0 {
            return Err(ForgeError::RecordNotFound {
                table: catalog::CATALOG_TABLE.to_string(),
                id: entity_id.to_string(),
            });
        }
        Ok(())
    }

    /// Write the data of catalog entity `entity_id`.
    ///
    /// The first save creates the class record and sets `has_data`; later saves
    /// update it. The catalog row must belong to `class_id`.
    pub async fn save_entity(
        &self,
        class_id: &str,
        entity_id: Uuid,
        data: EntityData,
    ) -> Result<serde_json::Value> {
        let adapter = self.adapters.get(class_id)?;
        let entry = self.catalog_entry(entity_id).await?;
        if entry.entity_class != class_id {
            return Err(ValidationFailure::EntityClassMismatch {
                expected: class_id.to_string(),
                found: entry.entity_class,
            }
            .into());
        }

        if entry.has_data {
            let saved = adapter.update(entity_id, data).await?;
            log::info!("updated data of {class_id} entity {entity_id}");
            return Ok(saved);
        }

        let saved = adapter.create(entity_id, data).await?;
        // The record is stored at this point; the flag is not rolled into the result.
        if let Err(err) = catalog::mark_has_data(&self.db, entity_id).await {
            log::error!("saved {class_id} entity {entity_id} but could not set has_data: {err}");
        }
        log::info!("created data of {class_id} entity {entity_id}");
        Ok(saved)
    }

    /// One page of the direct children of `parent_id`. `limit` must be in
    /// `1..=1000`.
    pub async fn entity_children(
        &self,
        parent_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<CatalogPage> {
        catalog::check_page_limit(limit)?;
        Ok(catalog::children(&self.db, parent_id, limit, offset).await?)
    }

    pub async fn create_entity(
        &self,
        class_id: &str,
        entity_id: Uuid,
        data: EntityData,
    ) -> Result<serde_json::Value> {
        self.adapters.get(class_id)?.create(entity_id, data).await
    }

    pub async fn read_entity(&self, class_id: &str, entity_id: Uuid) -> Result<serde_json::Value> {
        self.adapters.get(class_id)?.read(entity_id).await
    }

    pub async fn update_entity(
        &self,
        class_id: &str,
        entity_id: Uuid,
        data: EntityData,
    ) -> Result<serde_json::Value> {
        self.adapters.get(class_id)?.update(entity_id, data).await
    }

    pub async fn delete_entity(&self, class_id: &str, entity_id: Uuid) -> Result<()> {
        self.adapters.get(class_id)?.delete(entity_id).await
    }

    fn register_table_adapter(&self, definition: EntityDefinition) -> Result<()> {
        let class_id = definition.id.clone();
        let adapter: Arc<dyn EntityAdapter> =
            Arc::new(TableAdapter::new(self.db.clone(), definition)?);
        self.adapters.register(class_id, adapter);
        Ok(())
    }

    async fn lock_identity(&self, id: &str) -> IdentityGuard {
        let key = slugify(id);
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        IdentityGuard {
            key,
            locks: self.locks.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_identities(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

enum ConnectionSource {
    Url(String),
    Connection(DatabaseConnection),
}

/// Builder for [`EntityForge`].
pub struct EntityForgeBuilder {
    source: ConnectionSource,
    definitions_dir: PathBuf,
    schema_dir: PathBuf,
    bootstrap_catalog: bool,
    adapters: Option<Arc<AdapterRegistry>>,
}

impl EntityForgeBuilder {
    pub fn new(url: &str) -> Self {
        Self::from_source(ConnectionSource::Url(url.to_string()))
    }

    /// Build over a connection that is already open.
    pub fn with_connection(db: DatabaseConnection) -> Self {
        Self::from_source(ConnectionSource::Connection(db))
    }

    fn from_source(source: ConnectionSource) -> Self {
        Self {
            source,
            definitions_dir: PathBuf::from(DEFAULT_DEFINITIONS_DIR),
            schema_dir: PathBuf::from(DEFAULT_SCHEMA_DIR),
            bootstrap_catalog: true,
            adapters: None,
        }
    }

    pub fn with_definitions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.definitions_dir = dir.into();
        self
    }

    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = dir.into();
        self
    }

    /// Whether `build` creates the `entities` catalog table. On by default.
    pub fn with_catalog(mut self, enabled: bool) -> Self {
        self.bootstrap_catalog = enabled;
        self
    }

    /// Use this registry instead of one collected from link-time registrations.
    pub fn with_adapters(mut self, adapters: Arc<AdapterRegistry>) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Connect, create the catalog table and register a [`TableAdapter`] for
    /// every stored definition that has no adapter yet.
    pub async fn build(self) -> Result<EntityForge> {
        let db = match self.source {
            ConnectionSource::Url(url) => Database::connect(ConnectOptions::new(url)).await?,
            ConnectionSource::Connection(db) => db,
        };

        if self.bootstrap_catalog {
            catalog::create_catalog_table(&db).await?;
        }

        let adapters = match self.adapters {
            Some(adapters) => adapters,
            None => Arc::new(AdapterRegistry::from_inventory(&db)),
        };

        let forge = EntityForge {
            store: DefinitionStore::new(self.definitions_dir),
            artifacts: SchemaArtifacts::new(self.schema_dir),
            adapters,
            locks: Default::default(),
            db,
        };

        let mut registered = 0;
        for definition in forge.store.load_all().await? {
            if forge.adapters.is_registered(&definition.id) {
                continue;
            }
            forge.register_table_adapter(definition)?;
            registered += 1;
        }
        log::info!(
            "entity forge ready: {} definitions dir, {registered} table adapters registered",
            forge.store.dir().display()
        );

        Ok(forge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::DataComponent;
    use crate::components::ComponentKind;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use tempfile::TempDir;

    async fn forge(mock: MockDatabase) -> (EntityForge, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let forge = EntityForgeBuilder::with_connection(mock.into_connection())
            .with_definitions_dir(dir.path().join("definitions"))
            .with_schema_dir(dir.path().join("schema"))
            .with_catalog(false)
            .with_adapters(Arc::new(AdapterRegistry::new()))
            .build()
            .await
            .unwrap();
        (forge, dir)
    }

    fn product() -> EntityDefinition {
        EntityDefinition::new("Product", "Product")
            .with_component(DataComponent::new(ComponentKind::Input, "sku"))
    }

    #[tokio::test]
    async fn test_identity_locks_are_released_after_each_pipeline() {
        let mock = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            },
        ]);
        let (forge, _dir) = forge(mock).await;

        forge.create_definition(product()).await.unwrap();
        assert_eq!(forge.tracked_identities(), 0);

        // Rejected before touching the database, under many distinct ids.
        for n in 0..16 {
            let bad = EntityDefinition::new(format!("Bad{n}; DROP TABLE entities"), "Bad");
            assert!(forge.create_definition(bad).await.is_err());
            assert!(forge.delete_definition(&format!("Ghost{n}")).await.is_err());
        }
        assert_eq!(forge.tracked_identities(), 0);
    }

    #[tokio::test]
    async fn test_identity_lock_is_kept_while_contended() {
        let (forge, _dir) = forge(MockDatabase::new(DatabaseBackend::Postgres)).await;

        let first = forge.lock_identity("Product").await;
        assert_eq!(forge.tracked_identities(), 1);

        let waiter = forge.lock_identity("PRODUCT");
        tokio::pin!(waiter);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), &mut waiter)
                .await
                .is_err()
        );

        drop(first);
        assert_eq!(forge.tracked_identities(), 1);
        let second = waiter.await;
        drop(second);
        assert_eq!(forge.tracked_identities(), 0);
    }
}
