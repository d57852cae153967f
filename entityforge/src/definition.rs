//! Entity definitions: identity, display metadata and the component layout.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::component::DataComponent;
use crate::error::{Result, ValidationFailure};
use crate::ident;

pub const MAX_ID_LEN: usize = 255;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_COMPONENT_TEXT_LEN: usize = 255;

/// Prefix of every synthesized entity table.
pub const TABLE_PREFIX: &str = "entity_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allow_inherit: bool,
    #[serde(default)]
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(rename = "type", default = "Layout::default_type")]
    pub layout_type: String,
    #[serde(default)]
    pub components: Vec<DataComponent>,
}

impl Layout {
    fn default_type() -> String {
        "default".to_string()
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            layout_type: Self::default_type(),
            components: Vec::new(),
        }
    }
}

impl EntityDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            allow_inherit: false,
            layout: Layout::default(),
        }
    }

    pub fn with_component(mut self, component: DataComponent) -> Self {
        self.layout.components.push(component);
        self
    }

    pub fn components(&self) -> &[DataComponent] {
        &self.layout.components
    }

    pub fn component(&self, name: &str) -> Option<&DataComponent> {
        self.layout.components.iter().find(|c| c.name == name)
    }

    /// Physical table backing this definition: `entity_<id>`.
    pub fn table_name(&self) -> String {
        table_name_for(&self.id)
    }

    /// First component name that appears more than once in the layout.
    ///
    /// Postgres folds unquoted column names to lower case, so `sku` and `SKU`
    /// name the same column.
    pub fn duplicate_component_name(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.layout.components.len());
        self.layout
            .components
            .iter()
            .map(|c| c.name.as_str())
            .find(|name| !seen.insert(name.to_ascii_lowercase()))
    }

    /// Field-level checks that need no knowledge of other stored definitions:
    /// required fields, lengths, identifier safety and per-kind settings.
    pub fn validate_shape(&self) -> Result<()> {
        require("id", &self.id)?;
        require("name", &self.name)?;
        max_len("id", &self.id, MAX_ID_LEN)?;
        max_len("name", &self.name, MAX_NAME_LEN)?;
        max_len("description", &self.description, MAX_DESCRIPTION_LEN)?;
        ident::validate_identifier("id", &self.table_name())?;

        for component in &self.layout.components {
            require("components.name", &component.name)?;
            max_len("components.name", &component.name, MAX_COMPONENT_TEXT_LEN)?;
            max_len("components.title", &component.title, MAX_COMPONENT_TEXT_LEN)?;
            ident::validate_column_name("components.name", &component.name)?;
            component.validate_settings()?;
        }
        Ok(())
    }
}

pub fn table_name_for(id: &str) -> String {
    format!("{TABLE_PREFIX}{id}")
}

fn require(field: &str, value: &str) -> Result<(), ValidationFailure> {
    if value.trim().is_empty() {
        return Err(ValidationFailure::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> Result<(), ValidationFailure> {
    if value.chars().count() > max {
        return Err(ValidationFailure::FieldTooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}
