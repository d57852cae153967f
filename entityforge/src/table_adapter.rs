//! Runtime adapter over one definition's table.
//!
//! [`TableAdapter`] reads the layout of an [`EntityDefinition`] and issues
//! parameterized statements against `entity_<id>`. Records are addressed by
//! the catalog entity id they belong to, which the table holds once in its
//! unique `entity_id` column. Incoming JSON values are
//! converted per component kind and checked against the component settings
//! before any SQL runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, JsonValue, Statement, Value};
use uuid::Uuid;

use crate::adapter::{EntityAdapter, EntityData};
use crate::component::DataComponent;
use crate::components::ComponentKind;
use crate::definition::EntityDefinition;
use crate::error::{ForgeError, Result, ValidationFailure};
use crate::settings::ComponentSettings;

#[derive(Debug, Clone)]
pub struct TableAdapter {
    db: DatabaseConnection,
    definition: Arc<EntityDefinition>,
    table: String,
}

impl TableAdapter {
    /// Fails when the definition would not pass validation, since its
    /// identifiers end up in statement text.
    pub fn new(db: DatabaseConnection, definition: EntityDefinition) -> Result<Self> {
        definition.validate_shape()?;
        Ok(Self {
            db,
            table: definition.table_name(),
            definition: Arc::new(definition),
        })
    }

    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Bind values for the given data, in layout order.
    fn bind(&self, data: &EntityData) -> Result<Vec<(&str, Value)>> {
        if let Some(unknown) = data
            .keys()
            .find(|key| self.definition.component(key).is_none())
        {
            return Err(invalid(unknown, "not a field of this entity"));
        }

        self.definition
            .components()
            .iter()
            .filter_map(|c| data.get(&c.name).map(|value| (c, value)))
            .map(|(component, value)| Ok((component.name.as_str(), to_sql_value(component, value)?)))
            .collect()
    }

    fn statement(&self, sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(self.db.get_database_backend(), sql, values)
    }

    async fn fetch_one(&self, stmt: Statement, id: impl ToString) -> Result<JsonValue> {
        JsonValue::find_by_statement(stmt)
            .one(&self.db)
            .await?
            .ok_or_else(|| ForgeError::RecordNotFound {
                table: self.table.clone(),
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl EntityAdapter for TableAdapter {
    async fn create(&self, entity_id: Uuid, data: EntityData) -> Result<JsonValue> {
        let bound = self.bind(&data)?;

        for component in self.definition.components() {
            let supplied = bound.iter().any(|(name, _)| *name == component.name);
            if component.mandatory && !supplied && component.settings.default_literal().is_none() {
                return Err(invalid(&component.name, "mandatory field is missing"));
            }
        }

        let mut columns = vec!["entity_id"];
        let mut values: Vec<Value> = vec![entity_id.into()];
        for (name, value) in bound {
            columns.push(name);
            values.push(value);
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );

        log::debug!("creating record in {} for entity {entity_id}", self.table);
        self.fetch_one(self.statement(sql, values), entity_id).await
    }

    async fn read(&self, entity_id: Uuid) -> Result<JsonValue> {
        let sql = format!("SELECT * FROM {} WHERE entity_id = $1", self.table);
        self.fetch_one(self.statement(sql, vec![entity_id.into()]), entity_id)
            .await
    }

    async fn update(&self, entity_id: Uuid, data: EntityData) -> Result<JsonValue> {
        let bound = self.bind(&data)?;

        let mut assignments = Vec::with_capacity(bound.len() + 1);
        let mut values = Vec::with_capacity(bound.len() + 1);
        for (index, (name, value)) in bound.into_iter().enumerate() {
            assignments.push(format!("{name} = ${}", index + 1));
            values.push(value);
        }
        assignments.push("updated_at = NOW()".to_string());
        values.push(entity_id.into());

        let sql = format!(
            "UPDATE {} SET {} WHERE entity_id = ${} RETURNING *",
            self.table,
            assignments.join(", "),
            values.len()
        );

        log::debug!("updating record of entity {entity_id} in {}", self.table);
        self.fetch_one(self.statement(sql, values), entity_id).await
    }

    async fn delete(&self, entity_id: Uuid) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE entity_id = $1", self.table);
        let result = self
            .db
            .execute_raw(self.statement(sql, vec![entity_id.into()]))
            .await?;
        if result.rows_affected() == 0 {
            return Err(ForgeError::RecordNotFound {
                table: self.table.clone(),
                id: entity_id.to_string(),
            });
        }
        log::debug!("deleted record of entity {entity_id} from {}", self.table);
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ForgeError {
    ValidationFailure::InvalidEntityData {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Convert one JSON field value into a typed bind value for `component`.
fn to_sql_value(component: &DataComponent, value: &serde_json::Value) -> Result<Value> {
    let name = component.name.as_str();

    if value.is_null() {
        if component.mandatory {
            return Err(invalid(name, "mandatory field cannot be null"));
        }
        return Ok(match component.kind {
            ComponentKind::Input | ComponentKind::Textarea => Value::String(None),
            ComponentKind::Integer => Value::BigInt(None),
            ComponentKind::Float4 => Value::Float(None),
            ComponentKind::Float8 => Value::Double(None),
            ComponentKind::Date => Value::ChronoDate(None),
        });
    }

    match (&component.settings, component.kind) {
        (ComponentSettings::Input(settings), _) => {
            let text = value.as_str().ok_or_else(|| invalid(name, "expected a string"))?;
            if let Some(max) = settings.column_length
                && text.chars().count() as i64 > max
            {
                return Err(invalid(name, &format!("longer than {max} characters")));
            }
            if let Some(pattern) = settings.regex_validation.as_deref().filter(|p| !p.is_empty()) {
                let regex = regex::Regex::new(pattern)
                    .map_err(|_| invalid(name, "component carries an invalid pattern"))?;
                if !regex.is_match(text) {
                    return Err(invalid(name, "does not match the configured pattern"));
                }
            }
            Ok(text.to_string().into())
        }
        (ComponentSettings::Textarea(_), _) => {
            let text = value.as_str().ok_or_else(|| invalid(name, "expected a string"))?;
            Ok(text.to_string().into())
        }
        (ComponentSettings::Integer(settings), _) => {
            let number = value.as_i64().ok_or_else(|| invalid(name, "expected an integer"))?;
            if settings.unsigned && number < 0 {
                return Err(invalid(name, "must not be negative"));
            }
            if settings.min_value.is_some_and(|min| number < min)
                || settings.max_value.is_some_and(|max| number > max)
            {
                return Err(invalid(name, "outside the configured range"));
            }
            Ok(number.into())
        }
        (ComponentSettings::Float(settings), kind) => {
            let number = value.as_f64().ok_or_else(|| invalid(name, "expected a number"))?;
            if settings.min_value.is_some_and(|min| number < min)
                || settings.max_value.is_some_and(|max| number > max)
            {
                return Err(invalid(name, "outside the configured range"));
            }
            Ok(match kind {
                ComponentKind::Float4 => (number as f32).into(),
                _ => number.into(),
            })
        }
        (ComponentSettings::Date(_), _) => {
            let raw = value.as_str().ok_or_else(|| invalid(name, "expected a YYYY-MM-DD date"))?;
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| invalid(name, "expected a YYYY-MM-DD date"))?;
            Ok(date.into())
        }
    }
}
