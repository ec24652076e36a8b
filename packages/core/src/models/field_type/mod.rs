//! Field Type System
//!
//! Every field of a work item type carries a [`FieldType`] that knows how to move a
//! value between its external form ([`FieldValue`]) and the form stored inside the
//! work item's `Fields` JSON document (`serde_json::Value`).
//!
//! # Variants
//!
//! - [`SimpleType`] - a single primitive [`Kind`] (string, integer, instant, ...)
//! - [`EnumType`] - a simple type restricted to a closed set of stored values
//! - [`ListType`] - a homogeneous sequence of a simple component type
//!
//! Conversion is dispatched through the [`FieldConverter`] trait, so each variant owns
//! its own rules and adding a kind never touches a central switch.
//!
//! # Stored Form
//!
//! ```json
//! { "kind": "enum", "baseType": { "kind": "string" }, "values": ["new", "done"] }
//! { "kind": "list", "componentType": { "kind": "user" } }
//! { "kind": "instant" }
//! ```

mod enum_type;
mod list;
mod simple;

pub use enum_type::EnumType;
pub use list::ListType;
pub use simple::SimpleType;

use crate::models::markup::{CodebaseContent, MarkupContent};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Primitive category of a field's value
///
/// Immutable once chosen for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "instant")]
    Instant,
    #[serde(rename = "duration")]
    Duration,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "iteration")]
    Iteration,
    #[serde(rename = "workitem-reference")]
    WorkItemReference,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "enum")]
    Enum,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "markup")]
    Markup,
    #[serde(rename = "area")]
    Area,
    #[serde(rename = "codebase")]
    Codebase,
}

impl Kind {
    pub const ALL: [Kind; 14] = [
        Kind::String,
        Kind::Integer,
        Kind::Float,
        Kind::Instant,
        Kind::Duration,
        Kind::Url,
        Kind::Iteration,
        Kind::WorkItemReference,
        Kind::User,
        Kind::Enum,
        Kind::List,
        Kind::Markup,
        Kind::Area,
        Kind::Codebase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::Instant => "instant",
            Kind::Duration => "duration",
            Kind::Url => "url",
            Kind::Iteration => "iteration",
            Kind::WorkItemReference => "workitem-reference",
            Kind::User => "user",
            Kind::Enum => "enum",
            Kind::List => "list",
            Kind::Markup => "markup",
            Kind::Area => "area",
            Kind::Codebase => "codebase",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown field kind: {}", s))
    }
}

/// External, dynamically-typed value of a work item field
///
/// This is what callers hand to the conversion layer. Integers and floats are kept
/// apart so that the integer kinds can refuse fractional input.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Instant(DateTime<Utc>),
    Markup(MarkupContent),
    Codebase(CodebaseContent),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Short name of the dynamic type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::Instant(_) => "instant",
            FieldValue::Markup(_) => "markup content",
            FieldValue::Codebase(_) => "codebase content",
            FieldValue::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Build a value from already-decoded JSON
    ///
    /// Objects are read as markup content when they carry a `content` key and as
    /// codebase content when they carry a `repo` key. Instants have no JSON shape of
    /// their own and must be constructed explicitly by the caller.
    pub fn from_json(field: &str, value: &Value) -> Result<Self, FieldError> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(FieldValue::Integer(i)),
                None => n.as_f64().map(FieldValue::Float).ok_or_else(|| {
                    FieldError::invalid_value(field, value.to_string(), "number out of range")
                }),
            },
            Value::String(s) => Ok(FieldValue::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| FieldValue::from_json(field, item))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::List),
            Value::Object(map) if map.contains_key("content") => {
                Ok(FieldValue::Markup(MarkupContent::from_map(map)))
            }
            Value::Object(map) if map.contains_key("repo") => CodebaseContent::from_map(map)
                .map(FieldValue::Codebase)
                .map_err(|reason| FieldError::invalid_value(field, value.to_string(), reason)),
            Value::Object(_) => Err(FieldError::invalid_value(
                field,
                value.to_string(),
                "object is neither markup nor codebase content",
            )),
        }
    }

    /// Render the value back to plain JSON for callers
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Instant(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            FieldValue::Markup(m) => Value::Object(m.to_map()),
            FieldValue::Codebase(c) => Value::Object(c.to_map()),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "'{}'", s),
            FieldValue::Instant(t) => write!(f, "{}", t.to_rfc3339()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Instant(value)
    }
}

impl From<MarkupContent> for FieldValue {
    fn from(value: MarkupContent) -> Self {
        FieldValue::Markup(value)
    }
}

impl From<CodebaseContent> for FieldValue {
    fn from(value: CodebaseContent) -> Self {
        FieldValue::Codebase(value)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Field conversion errors
///
/// Every variant names the field and the value or type that was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field '{field}': expected a value of kind '{expected}', got {actual} {value}")]
    KindMismatch {
        field: String,
        expected: Kind,
        actual: &'static str,
        value: String,
    },

    #[error("field '{field}': '{value}' is not a valid URL")]
    InvalidUrl { field: String, value: String },

    #[error("field '{field}': value {value} is not one of the allowed values [{allowed}]")]
    NotAllowed {
        field: String,
        value: String,
        allowed: String,
    },

    #[error("field '{field}': list element {index} is invalid: {source}")]
    InvalidElement {
        field: String,
        index: usize,
        #[source]
        source: Box<FieldError>,
    },

    #[error("field '{field}': value required")]
    Required { field: String },

    #[error("field '{field}': {reason} (value {value})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("field '{field}': kind '{kind}' cannot be used as a simple type")]
    UnsupportedKind { field: String, kind: Kind },

    #[error("field '{field}': stored value {value} cannot be read as '{kind}'")]
    CorruptStoredValue {
        field: String,
        kind: Kind,
        value: String,
    },

    #[error("field '{field}' is not defined by work item type '{type_name}'")]
    UnknownField { field: String, type_name: String },
}

impl FieldError {
    pub fn kind_mismatch(field: &str, expected: Kind, value: &FieldValue) -> Self {
        Self::KindMismatch {
            field: field.to_string(),
            expected,
            actual: value.type_name(),
            value: value.to_string(),
        }
    }

    pub fn invalid_value(
        field: &str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(field: &str, kind: Kind, stored: &Value) -> Self {
        Self::CorruptStoredValue {
            field: field.to_string(),
            kind,
            value: stored.to_string(),
        }
    }

    /// Name of the field the error is attributed to
    pub fn field(&self) -> &str {
        match self {
            FieldError::KindMismatch { field, .. }
            | FieldError::InvalidUrl { field, .. }
            | FieldError::NotAllowed { field, .. }
            | FieldError::InvalidElement { field, .. }
            | FieldError::Required { field }
            | FieldError::InvalidValue { field, .. }
            | FieldError::UnsupportedKind { field, .. }
            | FieldError::CorruptStoredValue { field, .. }
            | FieldError::UnknownField { field, .. } => field,
        }
    }
}

/// Bidirectional conversion between the external and the stored representation
pub trait FieldConverter {
    /// Primitive category handled by this converter
    fn kind(&self) -> Kind;

    /// Validate an external value and turn it into its stored JSON form
    fn convert_to_model(&self, field: &str, value: &FieldValue) -> Result<Value, FieldError>;

    /// Rebuild the external value from its stored JSON form
    fn convert_from_model(&self, field: &str, stored: &Value) -> Result<FieldValue, FieldError>;
}

/// Type of a work item field
///
/// Equality is structural: two types are equal when their kinds, base/component
/// types and enum values are all equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldType", into = "RawFieldType")]
pub enum FieldType {
    Simple(SimpleType),
    Enum(EnumType),
    List(ListType),
}

impl FieldType {
    pub fn simple(kind: Kind) -> Self {
        FieldType::Simple(SimpleType::new(kind))
    }

    pub fn enumeration(base: Kind, values: Vec<Value>) -> Self {
        FieldType::Enum(EnumType::new(SimpleType::new(base), values))
    }

    pub fn list(component: Kind) -> Self {
        FieldType::List(ListType::new(SimpleType::new(component)))
    }
}

impl FieldConverter for FieldType {
    fn kind(&self) -> Kind {
        match self {
            FieldType::Simple(t) => t.kind(),
            FieldType::Enum(t) => t.kind(),
            FieldType::List(t) => t.kind(),
        }
    }

    fn convert_to_model(&self, field: &str, value: &FieldValue) -> Result<Value, FieldError> {
        match self {
            FieldType::Simple(t) => t.convert_to_model(field, value),
            FieldType::Enum(t) => t.convert_to_model(field, value),
            FieldType::List(t) => t.convert_to_model(field, value),
        }
    }

    fn convert_from_model(&self, field: &str, stored: &Value) -> Result<FieldValue, FieldError> {
        match self {
            FieldType::Simple(t) => t.convert_from_model(field, stored),
            FieldType::Enum(t) => t.convert_from_model(field, stored),
            FieldType::List(t) => t.convert_from_model(field, stored),
        }
    }
}

/// Flat serde shape shared by all field type variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldType {
    kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_type: Option<SimpleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    component_type: Option<SimpleType>,
}

impl TryFrom<RawFieldType> for FieldType {
    type Error = String;

    fn try_from(raw: RawFieldType) -> Result<Self, Self::Error> {
        match raw.kind {
            Kind::Enum => {
                let base = raw
                    .base_type
                    .ok_or_else(|| "enum type requires a baseType".to_string())?;
                let values = raw.values.unwrap_or_default();
                if values.is_empty() {
                    return Err("enum type requires at least one value".to_string());
                }
                Ok(FieldType::Enum(EnumType::new(base, values)))
            }
            Kind::List => raw
                .component_type
                .map(|component| FieldType::List(ListType::new(component)))
                .ok_or_else(|| "list type requires a componentType".to_string()),
            kind => Ok(FieldType::Simple(SimpleType::new(kind))),
        }
    }
}

impl From<FieldType> for RawFieldType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Simple(t) => RawFieldType {
                kind: t.kind,
                base_type: None,
                values: None,
                component_type: None,
            },
            FieldType::Enum(t) => RawFieldType {
                kind: Kind::Enum,
                base_type: Some(t.base_type),
                values: Some(t.values),
                component_type: None,
            },
            FieldType::List(t) => RawFieldType {
                kind: Kind::List,
                base_type: None,
                values: None,
                component_type: Some(t.component_type),
            },
        }
    }
}
