//! One configured field of an entity definition.

use serde::{Deserialize, Serialize};

use crate::components::{self, ColumnType, ComponentKind, ComponentTypeDefinition};
use crate::error::{ForgeError, Result, ValidationFailure};
use crate::settings::ComponentSettings;

/// A configured field: kind, naming, physical column type, modifiers and
/// kind-specific settings.
///
/// Deserialization parses `settings` with the shape the declared kind expects,
/// so an instance read from JSON always has matching settings. Instances built
/// in code are checked by [`DataComponent::validate_settings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataComponent", into = "RawDataComponent")]
pub struct DataComponent {
    pub kind: ComponentKind,
    pub name: String,
    pub title: String,
    pub column_type: ColumnType,
    pub mandatory: bool,
    pub invisible: bool,
    pub not_editable: bool,
    pub settings: ComponentSettings,
}

impl DataComponent {
    /// A component with the kind's default column type and empty settings.
    pub fn new(kind: ComponentKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind,
            title: name.clone(),
            name,
            column_type: components::lookup(kind).default_column_type.into(),
            mandatory: false,
            invisible: false,
            not_editable: false,
            settings: ComponentSettings::empty_for(kind),
        }
    }

    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_column_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    pub fn with_settings(mut self, settings: ComponentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Registry entry for this component's kind.
    pub fn definition(&self) -> &'static ComponentTypeDefinition {
        components::lookup(self.kind)
    }

    /// Column clause for `CREATE TABLE` / `ADD COLUMN`:
    /// `<name> <type> [DEFAULT <literal>] [NOT NULL]`.
    pub fn column_ddl(&self) -> String {
        let mut parts = vec![self.name.clone(), self.column_type.to_string()];
        if let Some(literal) = self.settings.default_literal() {
            parts.push(format!("DEFAULT {literal}"));
        }
        if self.mandatory {
            parts.push("NOT NULL".to_string());
        }
        parts.join(" ")
    }

    /// Check that the settings belong to this kind and satisfy its rules.
    pub fn validate_settings(&self) -> Result<()> {
        if !self.settings.fits(self.kind) {
            return Err(ForgeError::SettingsTypeMismatch {
                component: self.name.clone(),
                kind: self.kind.to_string(),
            });
        }
        self.settings.validate().map_err(|reason| {
            ValidationFailure::InvalidSettings {
                component: self.name.clone(),
                reason,
            }
            .into()
        })
    }
}

/// Wire form of [`DataComponent`], matching the definition JSON file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDataComponent {
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    name: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "dbtype", default, skip_serializing_if = "Option::is_none")]
    column_type: Option<String>,
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    invisible: bool,
    #[serde(default)]
    not_editable: bool,
    #[serde(default)]
    settings: serde_json::Value,
}

impl TryFrom<RawDataComponent> for DataComponent {
    type Error = ForgeError;

    fn try_from(raw: RawDataComponent) -> Result<Self> {
        let kind: ComponentKind = raw.kind.parse()?;

        let column_type = match raw.column_type.as_deref().filter(|s| !s.is_empty()) {
            Some(value) => value.parse::<ColumnType>().map_err(|_| {
                ValidationFailure::InvalidColumnType {
                    component: raw.name.clone(),
                    value: value.to_string(),
                }
            })?,
            None => components::lookup(kind).default_column_type.into(),
        };

        let settings = ComponentSettings::from_json(kind, raw.settings).map_err(|e| {
            log::debug!("settings for component '{}' do not fit kind {kind}: {e}", raw.name);
            ForgeError::SettingsTypeMismatch {
                component: raw.name.clone(),
                kind: kind.to_string(),
            }
        })?;

        Ok(DataComponent {
            kind,
            name: raw.name,
            title: raw.title,
            column_type,
            mandatory: raw.mandatory,
            invisible: raw.invisible,
            not_editable: raw.not_editable,
            settings,
        })
    }
}

impl From<DataComponent> for RawDataComponent {
    fn from(component: DataComponent) -> Self {
        let settings = component
            .settings
            .to_json()
            .unwrap_or(serde_json::Value::Null);
        RawDataComponent {
            kind: component.kind.to_string(),
            name: component.name,
            title: component.title,
            column_type: Some(component.column_type.to_string()),
            mandatory: component.mandatory,
            invisible: component.invisible,
            not_editable: component.not_editable,
            settings,
        }
    }
}
