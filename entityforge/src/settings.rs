//! Kind-specific component settings.
//!
//! [`ComponentSettings`] is a closed union with one variant per settings shape.
//! Column DDL and validation match on it exhaustively, so a new kind cannot be
//! added without deciding how its defaults render and how it validates.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::components::ComponentKind;

/// Settings for single-line text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, alias = "maxLength", skip_serializing_if = "Option::is_none")]
    pub column_length: Option<i64>,
    #[serde(default, alias = "regexPattern", skip_serializing_if = "Option::is_none")]
    pub regex_validation: Option<String>,
}

impl InputSettings {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(length) = self.column_length
            && length <= 0
        {
            return Err("columnLength must be greater than 0".into());
        }
        if let Some(pattern) = non_empty(&self.regex_validation) {
            regex::Regex::new(pattern).map_err(|e| format!("invalid regex pattern: {e}"))?;
        }
        Ok(())
    }
}

/// Settings for multi-line text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextareaSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    #[serde(default)]
    pub unsigned: bool,
}

impl IntegerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.min_value, self.max_value)
            && min > max
        {
            return Err("minValue cannot be greater than maxValue".into());
        }
        if self.unsigned && self.default_value.is_some_and(|v| v < 0) {
            return Err("defaultValue cannot be negative when unsigned is true".into());
        }
        if self.unsigned && self.min_value.is_some_and(|v| v < 0) {
            return Err("minValue cannot be negative when unsigned is true".into());
        }
        Ok(())
    }
}

/// Settings shared by `float4` and `float8`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl FloatSettings {
    pub fn validate(&self) -> Result<(), String> {
        for (label, value) in [
            ("defaultValue", self.default_value),
            ("minValue", self.min_value),
            ("maxValue", self.max_value),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(format!("{label} must be a finite number"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_value, self.max_value)
            && min > max
        {
            return Err("minValue cannot be greater than maxValue".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateSettings {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_date",
        deserialize_with = "deserialize_date"
    )]
    pub default_value: Option<NaiveDate>,
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn serialize_date<S: Serializer>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(date) => serializer.collect_str(&date.format(DATE_FORMAT)),
        None => serializer.serialize_none(),
    }
}

/// Accepts plain dates and RFC 3339 timestamps; the time part is dropped.
fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(date) = NaiveDate::parse_from_str(&raw, DATE_FORMAT) {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| Some(ts.date_naive()))
        .map_err(|_| serde::de::Error::custom(format!("'{raw}' is not a date")))
}

/// Settings payload of a component, tagged by the settings shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentSettings {
    Input(InputSettings),
    Textarea(TextareaSettings),
    Integer(IntegerSettings),
    Float(FloatSettings),
    Date(DateSettings),
}

impl ComponentSettings {
    /// Empty settings for a kind, used when a payload carries none.
    pub fn empty_for(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Input => ComponentSettings::Input(InputSettings::default()),
            ComponentKind::Textarea => ComponentSettings::Textarea(TextareaSettings::default()),
            ComponentKind::Integer => ComponentSettings::Integer(IntegerSettings::default()),
            ComponentKind::Float4 | ComponentKind::Float8 => {
                ComponentSettings::Float(FloatSettings::default())
            }
            ComponentKind::Date => ComponentSettings::Date(DateSettings::default()),
        }
    }

    /// Parse a raw JSON settings payload as the shape `kind` expects.
    pub fn from_json(kind: ComponentKind, value: serde_json::Value) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::empty_for(kind));
        }
        Ok(match kind {
            ComponentKind::Input => ComponentSettings::Input(serde_json::from_value(value)?),
            ComponentKind::Textarea => ComponentSettings::Textarea(serde_json::from_value(value)?),
            ComponentKind::Integer => ComponentSettings::Integer(serde_json::from_value(value)?),
            ComponentKind::Float4 | ComponentKind::Float8 => {
                ComponentSettings::Float(serde_json::from_value(value)?)
            }
            ComponentKind::Date => ComponentSettings::Date(serde_json::from_value(value)?),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            ComponentSettings::Input(s) => serde_json::to_value(s),
            ComponentSettings::Textarea(s) => serde_json::to_value(s),
            ComponentSettings::Integer(s) => serde_json::to_value(s),
            ComponentSettings::Float(s) => serde_json::to_value(s),
            ComponentSettings::Date(s) => serde_json::to_value(s),
        }
    }

    /// Whether this settings shape belongs to `kind`.
    pub fn fits(&self, kind: ComponentKind) -> bool {
        matches!(
            (self, kind),
            (ComponentSettings::Input(_), ComponentKind::Input)
                | (ComponentSettings::Textarea(_), ComponentKind::Textarea)
                | (ComponentSettings::Integer(_), ComponentKind::Integer)
                | (ComponentSettings::Float(_), ComponentKind::Float4 | ComponentKind::Float8)
                | (ComponentSettings::Date(_), ComponentKind::Date)
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ComponentSettings::Input(s) => s.validate(),
            ComponentSettings::Integer(s) => s.validate(),
            ComponentSettings::Float(s) => s.validate(),
            ComponentSettings::Textarea(_) | ComponentSettings::Date(_) => Ok(()),
        }
    }

    /// SQL literal for the configured default, or `None` when there is none.
    ///
    /// Strings are single-quoted with embedded quotes doubled, dates render as
    /// `'YYYY-MM-DD'`, numbers are unquoted.
    pub fn default_literal(&self) -> Option<String> {
        match self {
            ComponentSettings::Input(s) => non_empty(&s.default_value).map(quote_literal),
            ComponentSettings::Textarea(s) => non_empty(&s.default_value).map(quote_literal),
            ComponentSettings::Integer(s) => s.default_value.map(|v| v.to_string()),
            ComponentSettings::Float(s) => s.default_value.map(|v| v.to_string()),
            ComponentSettings::Date(s) => s
                .default_value
                .map(|d| format!("'{}'", d.format(DATE_FORMAT))),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
