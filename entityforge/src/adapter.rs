//! Entity adapters and the registry that dispatches to them.
//!
//! An [`EntityAdapter`] performs CRUD against one entity class's physical
//! table. The [`AdapterRegistry`] maps entity-class ids to adapters and is
//! consulted on every entity request. It is an owned value, shared through an
//! `Arc`, so deleting a definition can retire its adapter with
//! [`AdapterRegistry::unregister`].
//!
//! Adapters known at compile time can be registered at link time with
//! [`register_entity_adapter!`](crate::register_entity_adapter) and collected
//! with [`AdapterRegistry::from_inventory`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use sea_orm::DatabaseConnection;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ForgeError, Result};

/// Field values of one entity record, keyed by component name.
pub type EntityData = Map<String, Value>;

/// CRUD capability set for one entity class.
#[async_trait::async_trait]
pub trait EntityAdapter: Send + Sync {
    /// Insert a record owned by the catalog row `entity_id` and return it.
    async fn create(&self, entity_id: Uuid, data: EntityData) -> Result<Value>;

    /// Fetch the record of catalog entity `entity_id`.
    async fn read(&self, entity_id: Uuid) -> Result<Value>;

    /// Overwrite the given fields of a record and return the new state.
    async fn update(&self, entity_id: Uuid, data: EntityData) -> Result<Value>;

    async fn delete(&self, entity_id: Uuid) -> Result<()>;
}

/// Link-time adapter registration, collected by [`AdapterRegistry::from_inventory`].
pub struct AdapterRegistration {
    /// Entity-class id the adapter serves.
    pub class_id: &'static str,
    /// Builds the adapter over the process's connection.
    pub factory: fn(&DatabaseConnection) -> Arc<dyn EntityAdapter>,
}

inventory::collect!(AdapterRegistration);

/// Entity-class id to adapter map, guarded by a single reader/writer lock.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn EntityAdapter>>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("class_ids", &self.class_ids())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every adapter submitted through
    /// [`register_entity_adapter!`](crate::register_entity_adapter).
    pub fn from_inventory(db: &DatabaseConnection) -> Self {
        let registry = Self::new();
        for registration in inventory::iter::<AdapterRegistration> {
            registry.register(registration.class_id, (registration.factory)(db));
        }
        registry
    }

    /// Register an adapter. Replaces any existing entry for the same class.
    pub fn register(&self, class_id: impl Into<String>, adapter: Arc<dyn EntityAdapter>) {
        let class_id = class_id.into();
        log::debug!("registering adapter for entity class {class_id}");
        self.write().insert(class_id, adapter);
    }

    pub fn get(&self, class_id: &str) -> Result<Arc<dyn EntityAdapter>> {
        self.read()
            .get(class_id)
            .cloned()
            .ok_or_else(|| ForgeError::UnknownEntityClass(class_id.to_string()))
    }

    /// Remove the adapter for a class, returning it if one was registered.
    pub fn unregister(&self, class_id: &str) -> Option<Arc<dyn EntityAdapter>> {
        let removed = self.write().remove(class_id);
        if removed.is_some() {
            log::debug!("unregistered adapter for entity class {class_id}");
        }
        removed
    }

    pub fn is_registered(&self, class_id: &str) -> bool {
        self.read().contains_key(class_id)
    }

    /// Registered class ids, sorted.
    pub fn class_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn EntityAdapter>>> {
        self.adapters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn EntityAdapter>>> {
        self.adapters.write().unwrap_or_else(PoisonError::into_inner)
    }
}
