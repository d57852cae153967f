//! # entityforge
//!
//! Schema synthesis, definition diffing and adapter dispatch for dynamic
//! entities backed by PostgreSQL tables.
//!
//! Users describe an entity as a JSON [`EntityDefinition`]: an ordered list of
//! typed [`DataComponent`]s. entityforge validates the definition, creates an
//! `entity_<id>` table for it, keeps the definition document and the generated
//! DDL on disk, migrates the table when a new version of the definition
//! arrives, and routes entity CRUD to the [`EntityAdapter`] registered for the
//! entity class.
//!
//! ## Quick start
//!
//! ```ignore
//! use entityforge::{EntityDefinition, EntityForgeBuilder, NewCatalogEntry};
//!
//! let forge = EntityForgeBuilder::new("postgres://localhost/app")
//!     .with_definitions_dir("var/entities/definitions")
//!     .build()
//!     .await?;
//!
//! let definition: EntityDefinition = serde_json::from_str(body)?;
//! let table = forge.create_definition(definition).await?;
//!
//! let entry = forge
//!     .create_catalog_entry("Product", NewCatalogEntry::new("ab-1", "/products"))
//!     .await?;
//! let record = forge.save_entity("Product", entry.id, data).await?;
//! ```
//!
//! ## Key types
//!
//! - [`EntityForge`]: owns the connection, stores and adapter registry; runs
//!   the create, update and delete pipelines
//! - [`EntityForgeBuilder`]: configures directories and connects
//! - [`ComponentChangeset`]: what changed between two definition versions
//! - [`AdapterRegistry`]: entity-class id to [`EntityAdapter`] dispatch
//! - [`ForgeError`]: validation failures vs. storage failures
//!
//! Pipelines never roll back. A failure after the first side effect is
//! reported as a [`PipelineError`] naming the failed step and the steps that
//! stay applied.

pub mod adapter;
pub mod artifacts;
pub mod catalog;
pub mod component;
pub mod components;
pub mod definition;
pub mod diff;
pub mod error;
pub mod forge;
pub mod ident;
pub mod migrate;
pub mod pipeline;
pub mod settings;
pub mod slug;
pub mod store;
pub mod synth;
pub mod table_adapter;
pub mod validate;

pub use adapter::{AdapterRegistration, AdapterRegistry, EntityAdapter, EntityData};
pub use catalog::{CatalogEntry, CatalogPage, NewCatalogEntry};
pub use component::DataComponent;
pub use components::{ColumnType, ComponentKind, ComponentTypeDefinition};
pub use definition::{EntityDefinition, Layout};
pub use diff::ComponentChangeset;
pub use error::{ForgeError, Result, ValidationFailure};
pub use forge::{EntityForge, EntityForgeBuilder};
pub use migrate::{MigrationError, MigrationPhase, MigrationPlan};
pub use pipeline::{PipelineError, PipelineStep};
pub use settings::ComponentSettings;
pub use synth::{SynthesisError, SynthesisPhase};
pub use table_adapter::TableAdapter;

// Re-export for link-time adapter registration:
// `entityforge::register_entity_adapter! { AdapterRegistration { .. } }`
pub use inventory::submit as register_entity_adapter;

// Re-export sea-orm for users of the library
pub use sea_orm;
