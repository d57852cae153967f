//! Catalog of supported field kinds.
//!
//! Every [`ComponentKind`] maps to exactly one [`ComponentTypeDefinition`] in a
//! static table. The table never changes after start, so lookups by kind are
//! infallible; lookups by string go through [`lookup_str`] and fail with
//! [`ForgeError::UnknownComponentKind`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};

/// A supported field kind. The JSON form is the lower-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Input,
    Textarea,
    Integer,
    Float4,
    Float8,
    Date,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 6] = [
        ComponentKind::Input,
        ComponentKind::Textarea,
        ComponentKind::Integer,
        ComponentKind::Float4,
        ComponentKind::Float8,
        ComponentKind::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Input => "input",
            ComponentKind::Textarea => "textarea",
            ComponentKind::Integer => "integer",
            ComponentKind::Float4 => "float4",
            ComponentKind::Float8 => "float8",
            ComponentKind::Date => "date",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        ComponentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ForgeError::UnknownComponentKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentCategory {
    Text,
    Numeric,
    Date,
}

/// Static metadata for one component kind.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTypeDefinition {
    #[serde(rename = "id")]
    pub kind: ComponentKind,
    pub label: &'static str,
    pub category: ComponentCategory,
    pub tooltip: &'static str,
    pub icon: &'static str,
    #[serde(rename = "defaultDBType")]
    pub default_column_type: BaseColumnType,
}

static COMPONENT_TYPES: [ComponentTypeDefinition; 6] = [
    ComponentTypeDefinition {
        kind: ComponentKind::Input,
        label: "Input",
        category: ComponentCategory::Text,
        tooltip: "Single line text input field",
        icon: "text-cursor",
        default_column_type: BaseColumnType::Varchar,
    },
    ComponentTypeDefinition {
        kind: ComponentKind::Textarea,
        label: "Textarea",
        category: ComponentCategory::Text,
        tooltip: "Multi line text input field",
        icon: "text-cursor",
        default_column_type: BaseColumnType::Text,
    },
    ComponentTypeDefinition {
        kind: ComponentKind::Integer,
        label: "Integer",
        category: ComponentCategory::Numeric,
        tooltip: "Whole number field",
        icon: "hash",
        default_column_type: BaseColumnType::Integer,
    },
    ComponentTypeDefinition {
        kind: ComponentKind::Float4,
        label: "Float 4-byte",
        category: ComponentCategory::Numeric,
        tooltip: "Float 4-byte number field",
        icon: "hash",
        default_column_type: BaseColumnType::Float4,
    },
    ComponentTypeDefinition {
        kind: ComponentKind::Float8,
        label: "Float 8-byte",
        category: ComponentCategory::Numeric,
        tooltip: "Float 8-byte number field",
        icon: "hash",
        default_column_type: BaseColumnType::Float8,
    },
    ComponentTypeDefinition {
        kind: ComponentKind::Date,
        label: "Date",
        category: ComponentCategory::Date,
        tooltip: "Date picker field",
        icon: "calendar",
        default_column_type: BaseColumnType::Date,
    },
];

/// Registry entry for a kind.
pub fn lookup(kind: ComponentKind) -> &'static ComponentTypeDefinition {
    // The table is declared in `ComponentKind::ALL` order.
    &COMPONENT_TYPES[kind as usize]
}

/// Registry entry for a kind given by name, e.g. from an untyped payload.
pub fn lookup_str(kind: &str) -> Result<&'static ComponentTypeDefinition> {
    kind.parse::<ComponentKind>().map(lookup)
}

pub fn all_component_types() -> &'static [ComponentTypeDefinition] {
    &COMPONENT_TYPES
}

pub fn component_types_by_category(
    category: ComponentCategory,
) -> impl Iterator<Item = &'static ComponentTypeDefinition> {
    COMPONENT_TYPES
        .iter()
        .filter(move |def| def.category == category)
}

/// PostgreSQL base types a component column may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseColumnType {
    Varchar,
    Text,
    Char,
    Smallint,
    Integer,
    Bigint,
    Numeric,
    Decimal,
    Float4,
    Float8,
    Smallserial,
    Serial,
    Bigserial,
    Bytea,
    Bit,
    Date,
    Timestamp,
    Timestamptz,
    Time,
    Timetz,
    Interval,
    Boolean,
}

impl BaseColumnType {
    const ALL: [BaseColumnType; 22] = [
        BaseColumnType::Varchar,
        BaseColumnType::Text,
        BaseColumnType::Char,
        BaseColumnType::Smallint,
        BaseColumnType::Integer,
        BaseColumnType::Bigint,
        BaseColumnType::Numeric,
        BaseColumnType::Decimal,
        BaseColumnType::Float4,
        BaseColumnType::Float8,
        BaseColumnType::Smallserial,
        BaseColumnType::Serial,
        BaseColumnType::Bigserial,
        BaseColumnType::Bytea,
        BaseColumnType::Bit,
        BaseColumnType::Date,
        BaseColumnType::Timestamp,
        BaseColumnType::Timestamptz,
        BaseColumnType::Time,
        BaseColumnType::Timetz,
        BaseColumnType::Interval,
        BaseColumnType::Boolean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseColumnType::Varchar => "varchar",
            BaseColumnType::Text => "text",
            BaseColumnType::Char => "char",
            BaseColumnType::Smallint => "smallint",
            BaseColumnType::Integer => "integer",
            BaseColumnType::Bigint => "bigint",
            BaseColumnType::Numeric => "numeric",
            BaseColumnType::Decimal => "decimal",
            BaseColumnType::Float4 => "float4",
            BaseColumnType::Float8 => "float8",
            BaseColumnType::Smallserial => "smallserial",
            BaseColumnType::Serial => "serial",
            BaseColumnType::Bigserial => "bigserial",
            BaseColumnType::Bytea => "bytea",
            BaseColumnType::Bit => "bit",
            BaseColumnType::Date => "date",
            BaseColumnType::Timestamp => "timestamp",
            BaseColumnType::Timestamptz => "timestamptz",
            BaseColumnType::Time => "time",
            BaseColumnType::Timetz => "timetz",
            BaseColumnType::Interval => "interval",
            BaseColumnType::Boolean => "boolean",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == lowered)
    }
}

/// A physical column type: an allow-listed base type with an optional size
/// (`varchar(255)`) or precision/scale (`numeric(10,2)`).
///
/// Parsing is the only way in, so a `ColumnType` is always safe to splice into
/// DDL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnType {
    base: BaseColumnType,
    modifier: Option<(u32, Option<u32>)>,
}

impl ColumnType {
    pub fn new(base: BaseColumnType) -> Self {
        Self {
            base,
            modifier: None,
        }
    }

    /// Sized type like `varchar(255)`.
    pub fn with_size(mut self, size: u32) -> Self {
        self.modifier = Some((size, None));
        self
    }

    /// Precision type like `decimal(10,2)`.
    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.modifier = Some((precision, Some(scale)));
        self
    }

    pub fn base(&self) -> BaseColumnType {
        self.base
    }
}

impl From<BaseColumnType> for ColumnType {
    fn from(base: BaseColumnType) -> Self {
        ColumnType::new(base)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str())?;
        match self.modifier {
            Some((size, None)) => write!(f, "({size})"),
            Some((precision, Some(scale))) => write!(f, "({precision},{scale})"),
            None => Ok(()),
        }
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim();
        let (base, modifier) = match s.split_once('(') {
            None => (s, None),
            Some((base, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| format!("unterminated type modifier in '{s}'"))?;
                (base.trim(), Some(inner))
            }
        };

        let base = BaseColumnType::parse(base).ok_or_else(|| format!("unknown column type '{base}'"))?;
        let mut column = ColumnType::new(base);

        if let Some(inner) = modifier {
            let numbers = inner
                .split(',')
                .map(|part| part.trim().parse::<u32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| format!("type modifier must be numeric in '{s}'"))?;
            column = match numbers.as_slice() {
                [size] if *size > 0 => column.with_size(*size),
                [precision, scale] if *precision > 0 && scale <= precision => {
                    column.with_precision(*precision, *scale)
                }
                _ => return Err(format!("invalid type modifier in '{s}'")),
            };
        }

        Ok(column)
    }
}

impl Serialize for ColumnType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_matching_entry() {
        for kind in ComponentKind::ALL {
            assert_eq!(lookup(kind).kind, kind);
        }
    }

    #[test]
    fn test_lookup_str() {
        let def = lookup_str("integer").unwrap();
        assert_eq!(def.default_column_type, BaseColumnType::Integer);
        assert_eq!(def.category, ComponentCategory::Numeric);

        let err = lookup_str("checkbox").unwrap_err();
        assert!(matches!(err, ForgeError::UnknownComponentKind(k) if k == "checkbox"));
    }

    #[test]
    fn test_by_category() {
        let numeric: Vec<_> = component_types_by_category(ComponentCategory::Numeric)
            .map(|d| d.kind)
            .collect();
        assert_eq!(
            numeric,
            vec![ComponentKind::Integer, ComponentKind::Float4, ComponentKind::Float8]
        );
    }

    #[test]
    fn test_column_type_parsing() {
        assert_eq!("varchar".parse::<ColumnType>().unwrap().to_string(), "varchar");
        assert_eq!("VARCHAR(255)".parse::<ColumnType>().unwrap().to_string(), "varchar(255)");
        assert_eq!("numeric(10, 2)".parse::<ColumnType>().unwrap().to_string(), "numeric(10,2)");
        assert!("varchar(0)".parse::<ColumnType>().is_err());
        assert!("text; DROP TABLE users".parse::<ColumnType>().is_err());
        assert!("integer(".parse::<ColumnType>().is_err());
        assert!("jsonb".parse::<ColumnType>().is_err());
    }
}
