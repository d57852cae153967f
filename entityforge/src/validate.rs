//! Definition validation against the set of already stored definitions.
//!
//! The duplicate scan here is a fast pre-check. The uniqueness that actually
//! holds under concurrency comes from [`DefinitionStore::store_new`](crate::store::DefinitionStore::store_new),
//! which refuses to create a second document for the same slug.

use crate::definition::EntityDefinition;
use crate::error::{Result, ValidationFailure};
use crate::slug::slugify;

/// Checks for a definition that is about to be created.
///
/// Ids are compared by slug, so `Product` and `product!` collide. Names are
/// compared exactly.
pub fn validate_new_definition(
    definition: &EntityDefinition,
    existing: &[EntityDefinition],
) -> Result<()> {
    definition.validate_shape()?;

    let slug = slugify(&definition.id);
    if let Some(other) = existing.iter().find(|d| slugify(&d.id) == slug) {
        return Err(ValidationFailure::DuplicateId {
            id: other.id.clone(),
        }
        .into());
    }

    if existing.iter().any(|d| d.name == definition.name) {
        return Err(ValidationFailure::DuplicateName {
            name: definition.name.clone(),
        }
        .into());
    }

    reject_duplicate_components(definition)
}

/// Checks for a new version of a definition that already exists.
pub fn validate_existing_definition(definition: &EntityDefinition) -> Result<()> {
    definition.validate_shape()?;
    reject_duplicate_components(definition)
}

fn reject_duplicate_components(definition: &EntityDefinition) -> Result<()> {
    match definition.duplicate_component_name() {
        Some(name) => Err(ValidationFailure::DuplicateComponentName {
            name: name.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}
