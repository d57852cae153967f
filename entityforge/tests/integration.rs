use std::sync::Arc;

use entityforge::{
    AdapterRegistration, AdapterRegistry, EntityAdapter, EntityData, EntityDefinition, EntityForge,
    EntityForgeBuilder, ForgeError, MigrationPhase, NewCatalogEntry, PipelineStep, TableAdapter,
    ValidationFailure,
};
use sea_orm::{
    DatabaseBackend, DatabaseConnection, DbErr, MockDatabase, MockExecResult, Value,
};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ok(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

fn product() -> EntityDefinition {
    serde_json::from_value(json!({
        "id": "Product",
        "name": "Product",
        "layout": {
            "components": [
                {"kind": "input", "name": "sku", "mandatory": true},
                {"kind": "integer", "name": "qty"}
            ]
        }
    }))
    .expect("Failed to parse definition")
}

/// Executed SQL, in order.
fn executed(db: DatabaseConnection) -> Vec<String> {
    db.into_transaction_log()
        .iter()
        .flat_map(|t| t.statements().iter().map(|s| s.sql.clone()))
        .collect()
}

/// A forge over `mock` with its directories inside a fresh temp dir and an
/// empty adapter registry. The catalog table is not bootstrapped.
async fn forge_over(mock: MockDatabase) -> (EntityForge, DatabaseConnection, TempDir) {
    init_logging();
    let db = mock.into_connection();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let forge = EntityForgeBuilder::with_connection(db.clone())
        .with_definitions_dir(dir.path().join("definitions"))
        .with_schema_dir(dir.path().join("schema"))
        .with_catalog(false)
        .with_adapters(Arc::new(AdapterRegistry::new()))
        .build()
        .await
        .expect("Failed to build forge");
    (forge, db, dir)
}

#[tokio::test]
async fn test_product_create_then_update() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([ok(0), ok(0), ok(0)]);
    let (forge, db, _dir) = forge_over(mock).await;

    let table = forge
        .create_definition(product())
        .await
        .expect("Failed to create definition");
    assert_eq!(table, "entity_Product");
    assert!(forge.adapters().is_registered("Product"));

    let mut updated = product();
    updated.layout.components.retain(|c| c.name != "qty");
    updated.layout.components.push(
        serde_json::from_value(json!({"kind": "date", "name": "released"}))
            .expect("Failed to parse component"),
    );

    let changeset = forge
        .update_definition("Product", updated.clone())
        .await
        .expect("Failed to update definition");
    assert_eq!(changeset.added_names(), vec!["released"]);
    assert_eq!(changeset.removed_names(), vec!["qty"]);
    assert!(changeset.modified.is_empty());
    assert_eq!(changeset.unchanged_names(), vec!["sku"]);

    let stored = forge
        .load_definition_by_id("Product")
        .await
        .expect("Failed to load definition");
    assert_eq!(stored, updated);

    let artifact = forge
        .artifacts()
        .read("entity_Product")
        .await
        .expect("Failed to read artifact");
    assert!(artifact.ends_with("sku varchar NOT NULL, released date)"));

    let sql = executed(db);
    assert_eq!(sql.len(), 3);
    assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS entity_Product ("));
    assert!(sql[0].ends_with("sku varchar NOT NULL, qty integer)"));
    assert_eq!(sql[1], "ALTER TABLE IF EXISTS entity_Product ADD COLUMN released date");
    assert_eq!(sql[2], "ALTER TABLE IF EXISTS entity_Product DROP COLUMN qty");
}

#[tokio::test]
async fn test_create_entity_table_is_idempotent() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([ok(0), ok(0)]);
    let (forge, db, _dir) = forge_over(mock).await;

    let first = forge.create_entity_table(&product()).await.expect("first create");
    let second = forge.create_entity_table(&product()).await.expect("second create");
    assert_eq!(first, second);

    let artifact = forge.artifacts().read(&first).await.expect("Failed to read artifact");
    let sql = executed(db);
    assert_eq!(sql[0], sql[1]);
    assert_eq!(artifact, sql[1]);
}

#[tokio::test]
async fn test_duplicate_id_differing_by_case_is_rejected() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([ok(0)]);
    let (forge, db, _dir) = forge_over(mock).await;

    forge.create_definition(product()).await.expect("Failed to create definition");

    let mut shouting = product();
    shouting.id = "PRODUCT".into();
    shouting.name = "Other product".into();
    let err = forge.create_definition(shouting).await.unwrap_err();

    assert_eq!(
        err.validation_failure(),
        Some(&ValidationFailure::DuplicateId {
            id: "Product".into()
        })
    );
    // Rejected before any SQL ran.
    assert_eq!(executed(db).len(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_of_one_identity_are_serialized() {
    // One exec result: a second CREATE TABLE would fail with a mock error
    // instead of a duplicate id.
    let mock = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([ok(0)]);
    let (forge, db, _dir) = forge_over(mock).await;

    let mut shouting = product();
    shouting.id = "PRODUCT".into();
    shouting.name = "Other product".into();

    let (first, second) = tokio::join!(
        forge.create_definition(product()),
        forge.create_definition(shouting)
    );

    let (winner, loser) = match (first, second) {
        (Ok(table), Err(err)) | (Err(err), Ok(table)) => (table, err),
        (first, second) => panic!("expected exactly one success, got {first:?} and {second:?}"),
    };
    assert!(winner == "entity_Product" || winner == "entity_PRODUCT");
    assert!(matches!(
        loser.validation_failure(),
        Some(ValidationFailure::DuplicateId { .. })
    ));

    let sql = executed(db);
    assert_eq!(sql.len(), 1);
    assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS entity_"));
    assert_eq!(
        forge
            .load_definitions_from_entity_files()
            .await
            .expect("Failed to load definitions")
            .len(),
        1
    );
}

#[tokio::test]
async fn test_store_new_guards_against_a_stale_scan() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres);
    let (forge, _db, _dir) = forge_over(mock).await;

    forge
        .store()
        .store_new(&product())
        .await
        .expect("Failed to store definition");
    let err = forge.store().store_new(&product()).await.unwrap_err();
    assert!(matches!(
        err,
        ForgeError::Validation(ValidationFailure::DuplicateId { .. })
    ));
}

#[tokio::test]
async fn test_injection_attempts_never_reach_the_connection() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres);
    let (forge, db, dir) = forge_over(mock).await;

    let mut bad_id = product();
    bad_id.id = "Product; DROP TABLE entities; --".into();
    let err = forge.create_definition(bad_id).await.unwrap_err();
    assert!(err.is_validation());

    let bad_column: Result<EntityDefinition, _> = serde_json::from_value(json!({
        "id": "Product",
        "name": "Product",
        "layout": {"components": [
            {"kind": "input", "name": "sku", "dbtype": "varchar; DROP TABLE entities"}
        ]}
    }));
    assert!(bad_column.is_err());

    let mut keyword = product();
    keyword.layout.components[1].name = "select".into();
    assert!(forge.create_definition(keyword).await.unwrap_err().is_validation());

    let mut fixed = product();
    fixed.layout.components[1].name = "created_at".into();
    assert_eq!(
        forge
            .create_definition(fixed)
            .await
            .unwrap_err()
            .validation_failure(),
        Some(&ValidationFailure::ReservedColumnName {
            name: "created_at".into()
        })
    );

    assert!(executed(db).is_empty());
    assert!(!dir.path().join("definitions").join("entity_product.json").exists());
}

#[tokio::test]
async fn test_partial_migration_stays_applied() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([ok(0)])
        .append_exec_errors([DbErr::Custom("column \"qty\" is referenced".into())]);
    let (forge, db, _dir) = forge_over(mock).await;

    forge
        .store_definition_into_entity_file(&product())
        .await
        .expect("Failed to store definition");

    let mut proposed = product();
    proposed.layout.components.retain(|c| c.name != "qty");
    proposed.layout.components[0].mandatory = false;
    proposed.layout.components.push(
        serde_json::from_value(json!({"kind": "textarea", "name": "notes"}))
            .expect("Failed to parse component"),
    );

    let err = forge.update_definition("Product", proposed).await.unwrap_err();
    assert!(err.is_storage());
    let migration = match err {
        ForgeError::Migration(migration) => migration,
        other => panic!("expected a migration error, got {other:?}"),
    };
    assert_eq!(migration.phase, MigrationPhase::DropColumns);
    assert_eq!(migration.applied, vec![MigrationPhase::AddColumns]);
    assert_eq!(
        migration.statement,
        "ALTER TABLE IF EXISTS entity_Product DROP COLUMN qty"
    );

    // The stored document still describes the old layout.
    let stored = forge
        .load_definition_by_id("Product")
        .await
        .expect("Failed to load definition");
    assert_eq!(stored, product());

    let sql = executed(db);
    assert_eq!(sql.len(), 2);
    assert!(sql.iter().all(|s| !s.contains("ALTER COLUMN")));
}

#[tokio::test]
async fn test_update_requires_matching_id() {
    let (forge, _db, _dir) = forge_over(MockDatabase::new(DatabaseBackend::Postgres)).await;

    let err = forge.update_definition("Article", product()).await.unwrap_err();
    assert!(matches!(
        err.validation_failure(),
        Some(ValidationFailure::IdMismatch { .. })
    ));

    let err = forge.update_definition("Product", product()).await.unwrap_err();
    assert!(matches!(err, ForgeError::DefinitionNotFound(id) if id == "Product"));
}

#[tokio::test]
async fn test_delete_definition_retires_everything() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([ok(0), ok(0), ok(2)]);
    let (forge, db, dir) = forge_over(mock).await;

    forge.create_definition(product()).await.expect("Failed to create definition");
    let schema_file = dir.path().join("schema").join("entity_Product.sql");
    let definition_file = dir.path().join("definitions").join("entity_product.json");
    assert!(schema_file.exists());
    assert!(definition_file.exists());

    forge
        .delete_definition("Product")
        .await
        .expect("Failed to delete definition");

    assert!(!schema_file.exists());
    assert!(!definition_file.exists());
    assert!(!forge.adapters().is_registered("Product"));
    assert!(matches!(
        forge.read_entity("Product", Uuid::new_v4()).await,
        Err(ForgeError::UnknownEntityClass(_))
    ));

    let sql = executed(db);
    assert_eq!(sql[1], "DROP TABLE IF EXISTS entity_Product CASCADE");
    assert_eq!(sql[2], "DELETE FROM entities WHERE entity_class = $1");
}

#[tokio::test]
async fn test_delete_failure_reports_completed_steps() {
    let mock = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([ok(0), ok(0)])
        .append_exec_errors([DbErr::Custom("relation \"entities\" does not exist".into())]);
    let (forge, _db, dir) = forge_over(mock).await;

    forge.create_definition(product()).await.expect("Failed to create definition");

    let err = forge.delete_definition("Product").await.unwrap_err();
    assert!(err.is_storage());
    let pipeline = match err {
        ForgeError::Pipeline(pipeline) => pipeline,
        other => panic!("expected a pipeline error, got {other:?}"),
    };
    assert_eq!(pipeline.step, PipelineStep::DeleteCatalogRows);
    assert_eq!(
        pipeline.completed,
        vec![PipelineStep::LoadDefinition, PipelineStep::DropTable]
    );

    // Nothing after the failed step ran.
    assert!(dir.path().join("definitions").join("entity_product.json").exists());
    assert!(forge.adapters().is_registered("Product"));
}

#[tokio::test]
async fn test_delete_unknown_definition() {
    let (forge, db, _dir) = forge_over(MockDatabase::new(DatabaseBackend::Postgres)).await;
    let err = forge.delete_definition("Ghost").await.unwrap_err();
    assert!(matches!(err, ForgeError::DefinitionNotFound(_)));
    assert!(executed(db).is_empty());
}

#[tokio::test]
async fn test_build_bootstraps_catalog_and_stored_adapters() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    entityforge::store::DefinitionStore::new(dir.path())
        .store(&product())
        .await
        .expect("Failed to store definition");

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([ok(0)])
        .into_connection();
    let forge = EntityForgeBuilder::with_connection(db.clone())
        .with_definitions_dir(dir.path())
        .with_schema_dir(dir.path().join("schema"))
        .with_adapters(Arc::new(AdapterRegistry::new()))
        .build()
        .await
        .expect("Failed to build forge");

    assert!(forge.adapters().is_registered("Product"));
    let sql = executed(db);
    assert_eq!(sql.len(), 1);
    assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS entities ("));
}

#[tokio::test]
async fn test_table_adapter_statements() {
    init_logging();
    let record_id = Uuid::new_v4();
    let entity_id = Uuid::new_v4();
    let row = || {
        std::collections::BTreeMap::from([
            ("id", Value::from(record_id)),
            ("sku", Value::from("AB-1")),
            ("qty", Value::from(3i64)),
        ])
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![row()], vec![row()], vec![row()]])
        .append_exec_results([ok(1), ok(0)])
        .into_connection();
    let adapter = TableAdapter::new(db.clone(), product()).expect("Failed to build adapter");

    let data = |value: serde_json::Value| -> EntityData {
        value.as_object().cloned().expect("object")
    };

    let created = adapter
        .create(entity_id, data(json!({"sku": "AB-1", "qty": 3})))
        .await
        .expect("Failed to create record");
    assert_eq!(created["sku"], "AB-1");

    let read = adapter.read(entity_id).await.expect("Failed to read record");
    assert_eq!(read["qty"], 3);
    assert_eq!(read["id"], record_id.to_string());

    adapter
        .update(entity_id, data(json!({"qty": 4})))
        .await
        .expect("Failed to update record");

    adapter.delete(entity_id).await.expect("Failed to delete record");
    assert!(matches!(
        adapter.delete(entity_id).await,
        Err(ForgeError::RecordNotFound { .. })
    ));

    // Rejected before reaching the connection.
    let missing_sku = adapter.create(entity_id, data(json!({"qty": 1}))).await;
    assert!(missing_sku.unwrap_err().is_validation());
    let unknown_key = adapter.update(entity_id, data(json!({"colour": "red"}))).await;
    assert!(unknown_key.unwrap_err().is_validation());

    let log = db.into_transaction_log();
    let statements: Vec<_> = log.iter().flat_map(|t| t.statements().to_vec()).collect();
    assert_eq!(statements.len(), 5);

    assert_eq!(
        statements[0].sql,
        "INSERT INTO entity_Product (entity_id, sku, qty) VALUES ($1, $2, $3) RETURNING *"
    );
    assert_eq!(
        statements[0].values.as_ref().map(|v| v.0.clone()),
        Some(vec![Value::from(entity_id), Value::from("AB-1"), Value::from(3i64)])
    );
    assert_eq!(statements[1].sql, "SELECT * FROM entity_Product WHERE entity_id = $1");
    assert_eq!(
        statements[2].sql,
        "UPDATE entity_Product SET qty = $1, updated_at = NOW() WHERE entity_id = $2 RETURNING *"
    );
    assert_eq!(
        statements[2].values.as_ref().map(|v| v.0.clone()),
        Some(vec![Value::from(4i64), Value::from(entity_id)])
    );
    assert_eq!(statements[3].sql, "DELETE FROM entity_Product WHERE entity_id = $1");
}

fn catalog_row(
    id: Uuid,
    class_id: &str,
    has_data: bool,
) -> std::collections::BTreeMap<&'static str, Value> {
    let now = chrono::Utc::now();
    std::collections::BTreeMap::from([
        ("id", Value::from(id)),
        ("entity_class", Value::from(class_id)),
        ("parent_id", Value::Uuid(None)),
        ("o_key", Value::from("ab-1")),
        ("o_path", Value::from("/products")),
        ("o_type", Value::from("object")),
        ("published", Value::from(false)),
        ("has_data", Value::from(has_data)),
        ("created_at", Value::from(now)),
        ("updated_at", Value::from(now)),
    ])
}

#[tokio::test]
async fn test_save_entity_creates_then_updates() {
    let entity_id = Uuid::new_v4();
    let record = || {
        std::collections::BTreeMap::from([
            ("entity_id", Value::from(entity_id)),
            ("sku", Value::from("AB-1")),
            ("qty", Value::from(3i64)),
        ])
    };
    let mock = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([ok(0), ok(1)])
        .append_query_results([
            vec![catalog_row(entity_id, "Product", false)],
            vec![catalog_row(entity_id, "Product", false)],
            vec![record()],
            vec![catalog_row(entity_id, "Product", true)],
            vec![record()],
        ]);
    let (forge, db, _dir) = forge_over(mock).await;
    forge.create_definition(product()).await.expect("Failed to create definition");

    let entry = forge
        .create_catalog_entry("Product", NewCatalogEntry::new("ab-1", "/products"))
        .await
        .expect("Failed to create catalog entry");
    assert_eq!(entry.id, entity_id);
    assert!(!entry.has_data);

    let data = |value: serde_json::Value| -> EntityData {
        value.as_object().cloned().expect("object")
    };
    let saved = forge
        .save_entity("Product", entity_id, data(json!({"sku": "AB-1", "qty": 3})))
        .await
        .expect("Failed to save entity");
    assert_eq!(saved["sku"], "AB-1");
    forge
        .save_entity("Product", entity_id, data(json!({"qty": 4})))
        .await
        .expect("Failed to save entity again");

    let sql = executed(db);
    assert!(sql[1].starts_with("INSERT INTO entities (entity_class"));
    assert_eq!(sql[2], "SELECT * FROM entities WHERE id = $1");
    assert!(sql[3].starts_with("INSERT INTO entity_Product (entity_id, sku, qty)"));
    assert_eq!(
        sql[4],
        "UPDATE entities SET has_data = TRUE, updated_at = NOW() WHERE id = $1"
    );
    assert_eq!(sql[5], "SELECT * FROM entities WHERE id = $1");
    assert!(sql[6].starts_with("UPDATE entity_Product SET qty = $1"));
    assert_eq!(sql.len(), 7);
}

#[tokio::test]
async fn test_save_entity_checks_the_catalog_class() {
    let entity_id = Uuid::new_v4();
    let mock = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([ok(0)])
        .append_query_results([
            vec![catalog_row(entity_id, "Article", false)],
            Vec::new(),
        ]);
    let (forge, db, _dir) = forge_over(mock).await;
    forge.create_definition(product()).await.expect("Failed to create definition");

    let data = json!({"sku": "AB-1"}).as_object().cloned().expect("object");
    let err = forge
        .save_entity("Product", entity_id, data.clone())
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_failure(),
        Some(&ValidationFailure::EntityClassMismatch {
            expected: "Product".into(),
            found: "Article".into(),
        })
    );

    let missing = forge.save_entity("Product", Uuid::new_v4(), data).await;
    assert!(matches!(missing, Err(ForgeError::RecordNotFound { .. })));

    let unknown = forge
        .create_catalog_entry("Ghost", NewCatalogEntry::new("k", "/"))
        .await;
    assert!(matches!(unknown, Err(ForgeError::UnknownEntityClass(_))));
    let too_many = forge.entity_children(entity_id, 1001, 0).await.unwrap_err();
    assert!(too_many.is_validation());

    // Only the CREATE TABLE and the two catalog lookups ran.
    assert_eq!(executed(db).len(), 3);
}

struct LedgerAdapter;

#[async_trait::async_trait]
impl EntityAdapter for LedgerAdapter {
    async fn create(&self, entity_id: Uuid, data: EntityData) -> entityforge::Result<serde_json::Value> {
        Ok(json!({"entity_id": entity_id.to_string(), "data": data}))
    }

    async fn read(&self, id: Uuid) -> entityforge::Result<serde_json::Value> {
        Ok(json!({"id": id.to_string(), "source": "ledger"}))
    }

    async fn update(&self, id: Uuid, data: EntityData) -> entityforge::Result<serde_json::Value> {
        Ok(json!({"id": id.to_string(), "data": data}))
    }

    async fn delete(&self, _id: Uuid) -> entityforge::Result<()> {
        Ok(())
    }
}

fn ledger_adapter(_db: &DatabaseConnection) -> Arc<dyn EntityAdapter> {
    Arc::new(LedgerAdapter)
}

entityforge::register_entity_adapter! {
    AdapterRegistration {
        class_id: "Ledger",
        factory: ledger_adapter,
    }
}

#[tokio::test]
async fn test_link_time_adapters_are_dispatched() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let forge = EntityForgeBuilder::with_connection(db)
        .with_definitions_dir(dir.path())
        .with_catalog(false)
        .build()
        .await
        .expect("Failed to build forge");

    assert!(forge.adapters().class_ids().contains(&"Ledger".to_string()));

    let id = Uuid::new_v4();
    let out = forge.read_entity("Ledger", id).await.expect("Failed to read entity");
    assert_eq!(out["source"], "ledger");
    assert_eq!(out["id"], id.to_string());

    assert!(matches!(
        forge.read_entity("Unknown", id).await,
        Err(ForgeError::UnknownEntityClass(class)) if class == "Unknown"
    ));
}

#[tokio::test]
async fn test_component_types_listing() {
    let (forge, _db, _dir) = forge_over(MockDatabase::new(DatabaseBackend::Postgres)).await;
    let kinds: Vec<String> = forge
        .component_types()
        .iter()
        .map(|t| t.kind.to_string())
        .collect();
    assert_eq!(kinds, ["input", "textarea", "integer", "float4", "float8", "date"]);
}
