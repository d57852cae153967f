//! Field-by-field comparison of two definition versions.
//!
//! Components are matched by name, ignoring ASCII case the way Postgres folds
//! unquoted column names. A name only in the proposed layout is added, a name
//! only in the existing layout is removed, and a name on both sides is
//! unchanged when the two components are structurally equal (kind, title,
//! column type, modifiers and settings payload) and modified otherwise.
//! A rename therefore shows up as one removal plus one addition, except for a
//! case-only rename, which is a modification of the same column.

use std::collections::{HashMap, HashSet};

use crate::component::DataComponent;
use crate::definition::EntityDefinition;
use crate::error::{Result, ValidationFailure};

/// Result of comparing two definitions. The four lists are disjoint by name.
///
/// List order is not part of the contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentChangeset {
    pub added: Vec<DataComponent>,
    pub removed: Vec<DataComponent>,
    pub modified: Vec<DataComponent>,
    pub unchanged: Vec<DataComponent>,
}

impl ComponentChangeset {
    /// Classify every component of `existing` and `proposed`.
    ///
    /// Modified entries carry the proposed version of the component. If a
    /// layout repeats a name, its last occurrence wins.
    pub fn between(existing: &EntityDefinition, proposed: &EntityDefinition) -> Self {
        let before = by_column(existing);
        let after = by_column(proposed);

        let mut changeset = ComponentChangeset::default();
        let mut seen = HashSet::with_capacity(after.len());

        for component in proposed.components() {
            let key = component.name.to_ascii_lowercase();
            if !seen.insert(key.clone()) {
                continue;
            }
            let current = after[&key];
            match before.get(&key) {
                None => changeset.added.push(current.clone()),
                Some(old) if *old == current => changeset.unchanged.push(current.clone()),
                Some(_) => changeset.modified.push(current.clone()),
            }
        }

        let mut seen = HashSet::with_capacity(before.len());
        for component in existing.components() {
            let key = component.name.to_ascii_lowercase();
            if !after.contains_key(&key) && seen.insert(key.clone()) {
                changeset.removed.push(before[&key].clone());
            }
        }

        changeset
    }

    /// True when applying this changeset would not touch the table.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn added_names(&self) -> Vec<&str> {
        names(&self.added)
    }

    pub fn removed_names(&self) -> Vec<&str> {
        names(&self.removed)
    }

    pub fn modified_names(&self) -> Vec<&str> {
        names(&self.modified)
    }

    pub fn unchanged_names(&self) -> Vec<&str> {
        names(&self.unchanged)
    }
}

/// Components keyed by their folded column name; the last occurrence wins.
fn by_column(definition: &EntityDefinition) -> HashMap<String, &DataComponent> {
    definition
        .components()
        .iter()
        .map(|c| (c.name.to_ascii_lowercase(), c))
        .collect()
}

fn names(components: &[DataComponent]) -> Vec<&str> {
    components.iter().map(|c| c.name.as_str()).collect()
}

/// Compare two definitions, refusing layouts that repeat a component name.
pub fn compare_definitions(
    existing: &EntityDefinition,
    proposed: &EntityDefinition,
) -> Result<ComponentChangeset> {
    for definition in [existing, proposed] {
        if let Some(name) = definition.duplicate_component_name() {
            return Err(ValidationFailure::DuplicateComponentName {
                name: name.to_string(),
            }
            .into());
        }
    }
    Ok(ComponentChangeset::between(existing, proposed))
}
