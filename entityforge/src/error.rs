//! Error taxonomy for the schema engine.
//!
//! Failures fall into two buckets that callers treat differently:
//! - validation failures ([`ValidationFailure`], unknown kinds, settings that do
//!   not fit their kind) are caller errors and carry a machine-readable reason;
//! - storage failures (SQL execution, file I/O, JSON encoding) are server errors
//!   that should be logged with context and reported opaquely.
//!
//! [`ForgeError::UnknownEntityClass`] is a caller error of its own, distinct
//! from both.

use sea_orm::DbErr;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

use crate::migrate::MigrationError;
use crate::pipeline::PipelineError;
use crate::synth::SynthesisError;

pub type Result<T, E = ForgeError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("validation failed: {0}")]
    Validation(ValidationFailure),

    #[error("unknown component kind: {0}")]
    UnknownComponentKind(String),

    #[error("component '{component}' carries settings that do not match kind '{kind}'")]
    SettingsTypeMismatch { component: String, kind: String },

    #[error("no adapter registered for entity class: {0}")]
    UnknownEntityClass(String),

    #[error("no definition stored for '{0}'")]
    DefinitionNotFound(String),

    #[error("record {id} not found in {table}")]
    RecordNotFound { table: String, id: String },

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("file access failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Pipeline(#[from] Box<PipelineError>),
}

impl ForgeError {
    /// Caller-side problems with the submitted definition or payload.
    pub fn is_validation(&self) -> bool {
        match self {
            ForgeError::Validation(_)
            | ForgeError::UnknownComponentKind(_)
            | ForgeError::SettingsTypeMismatch { .. } => true,
            ForgeError::Pipeline(p) => p.source.is_validation(),
            _ => false,
        }
    }

    /// SQL or file-system failures. These are never retried.
    pub fn is_storage(&self) -> bool {
        match self {
            ForgeError::Database(_)
            | ForgeError::Io(_)
            | ForgeError::Json(_)
            | ForgeError::Synthesis(_)
            | ForgeError::Migration(_) => true,
            ForgeError::Pipeline(p) => p.source.is_storage(),
            _ => false,
        }
    }

    /// The validation failure behind this error, if there is one.
    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            ForgeError::Validation(v) => Some(v),
            ForgeError::Pipeline(p) => p.source.validation_failure(),
            _ => None,
        }
    }
}

impl From<ValidationFailure> for ForgeError {
    fn from(value: ValidationFailure) -> Self {
        ForgeError::Validation(value)
    }
}

/// A user-facing validation failure.
///
/// Serializes to a flat JSON object: `{"error": "<reason>", "<key>": "<value>", ...}`,
/// e.g. `{"error": "entity id already exists", "conflictingId": "Product"}`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("entity id already exists: {id}")]
    DuplicateId { id: String },

    #[error("entity name already exists: {name}")]
    DuplicateName { name: String },

    #[error("entity duplicated component name: {name}")]
    DuplicateComponentName { name: String },

    #[error("required field '{field}' is missing")]
    MissingField { field: String },

    #[error("field '{field}' exceeds {max} characters")]
    FieldTooLong { field: String, max: usize },

    #[error("'{value}' is not a valid identifier for {field}: {reason}")]
    InvalidIdentifier {
        field: String,
        value: String,
        reason: String,
    },

    #[error("component name '{name}' collides with a fixed column")]
    ReservedColumnName { name: String },

    #[error("component '{component}' has an unsupported column type '{value}'")]
    InvalidColumnType { component: String, value: String },

    #[error("component '{component}' has invalid settings: {reason}")]
    InvalidSettings { component: String, reason: String },

    #[error("definition id '{found}' does not match '{expected}'")]
    IdMismatch { expected: String, found: String },

    #[error("entity data field '{field}' is invalid: {reason}")]
    InvalidEntityData { field: String, reason: String },

    #[error("entity belongs to class '{found}', not '{expected}'")]
    EntityClassMismatch { expected: String, found: String },

    #[error("page limit {limit} is outside 1..={max}")]
    InvalidPageLimit { limit: u64, max: u64 },
}

impl ValidationFailure {
    /// Stable, machine-readable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationFailure::DuplicateId { .. } => "entity id already exists",
            ValidationFailure::DuplicateName { .. } => "entity name already exists",
            ValidationFailure::DuplicateComponentName { .. } => "entity duplicated component name",
            ValidationFailure::MissingField { .. } => "required field is missing",
            ValidationFailure::FieldTooLong { .. } => "field exceeds maximum length",
            ValidationFailure::InvalidIdentifier { .. } => "invalid identifier",
            ValidationFailure::ReservedColumnName { .. } => "component name is reserved",
            ValidationFailure::InvalidColumnType { .. } => "unsupported column type",
            ValidationFailure::InvalidSettings { .. } => "invalid component settings",
            ValidationFailure::IdMismatch { .. } => "definition id mismatch",
            ValidationFailure::InvalidEntityData { .. } => "invalid entity data",
            ValidationFailure::EntityClassMismatch { .. } => "entity class mismatch",
            ValidationFailure::InvalidPageLimit { .. } => "invalid page limit",
        }
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        match self {
            ValidationFailure::DuplicateId { id } => vec![("conflictingId", id.clone())],
            ValidationFailure::DuplicateName { name } => vec![("conflictingName", name.clone())],
            ValidationFailure::DuplicateComponentName { name } => {
                vec![("conflictingComponentName", name.clone())]
            }
            ValidationFailure::MissingField { field } => vec![("field", field.clone())],
            ValidationFailure::FieldTooLong { field, max } => {
                vec![("field", field.clone()), ("maxLength", max.to_string())]
            }
            ValidationFailure::InvalidIdentifier {
                field,
                value,
                reason,
            } => vec![
                ("field", field.clone()),
                ("value", value.clone()),
                ("detail", reason.clone()),
            ],
            ValidationFailure::ReservedColumnName { name } => {
                vec![("conflictingComponentName", name.clone())]
            }
            ValidationFailure::InvalidColumnType { component, value } => {
                vec![("component", component.clone()), ("dbtype", value.clone())]
            }
            ValidationFailure::InvalidSettings { component, reason } => {
                vec![("component", component.clone()), ("detail", reason.clone())]
            }
            ValidationFailure::IdMismatch { expected, found } => {
                vec![("expectedId", expected.clone()), ("foundId", found.clone())]
            }
            ValidationFailure::InvalidEntityData { field, reason } => {
                vec![("field", field.clone()), ("detail", reason.clone())]
            }
            ValidationFailure::EntityClassMismatch { expected, found } => {
                vec![("expectedClass", expected.clone()), ("actualClass", found.clone())]
            }
            ValidationFailure::InvalidPageLimit { limit, max } => {
                vec![("limit", limit.to_string()), ("maxLimit", max.to_string())]
            }
        }
    }
}

impl Serialize for ValidationFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let details = self.details();
        let mut map = serializer.serialize_map(Some(details.len() + 1))?;
        map.serialize_entry("error", self.reason())?;
        for (key, value) in &details {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
