//! Field definitions
//!
//! A [`FieldDefinition`] wraps a [`FieldType`] with the metadata a work item type
//! declares for one of its fields. Required-ness is enforced here, before the type's
//! own conversion runs.

use crate::models::field_type::{FieldConverter, FieldError, FieldType, FieldValue, Kind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub required: bool,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldDefinition {
    pub fn new(label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            label: label.into(),
            description: String::new(),
            field_type,
        }
    }

    pub fn required(label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: true,
            ..Self::new(label, field_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn convert_to_model(&self, name: &str, value: &FieldValue) -> Result<Value, FieldError> {
        if self.required && self.is_missing(value) {
            return Err(FieldError::Required {
                field: name.to_string(),
            });
        }
        self.field_type.convert_to_model(name, value)
    }

    pub fn convert_from_model(&self, name: &str, stored: &Value) -> Result<FieldValue, FieldError> {
        self.field_type.convert_from_model(name, stored)
    }

    /// Overrides must keep `required` and the exact field type; label and description may change
    pub fn is_compatible_with(&self, other: &FieldDefinition) -> bool {
        self.required == other.required && self.field_type == other.field_type
    }

    fn is_missing(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Null => true,
            FieldValue::String(s) => self.field_type.kind() == Kind::String && s.trim().is_empty(),
            _ => false,
        }
    }
}
