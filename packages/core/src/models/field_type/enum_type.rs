use super::{FieldConverter, FieldError, FieldValue, Kind, SimpleType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A simple type restricted to a closed set of allowed stored values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumType {
    pub base_type: SimpleType,
    pub values: Vec<Value>,
}

impl EnumType {
    pub fn new(base_type: SimpleType, values: Vec<Value>) -> Self {
        Self { base_type, values }
    }

    fn check_allowed(&self, field: &str, stored: &Value) -> Result<(), FieldError> {
        if self.values.iter().any(|allowed| same_value(allowed, stored)) {
            return Ok(());
        }
        Err(FieldError::NotAllowed {
            field: field.to_string(),
            value: stored.to_string(),
            allowed: self
                .values
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Numbers compare by value, so a stored `1.0` matches an allowed `1`
fn same_value(allowed: &Value, stored: &Value) -> bool {
    match (allowed, stored) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => allowed == stored,
    }
}

impl FieldConverter for EnumType {
    fn kind(&self) -> Kind {
        Kind::Enum
    }

    fn convert_to_model(&self, field: &str, value: &FieldValue) -> Result<Value, FieldError> {
        let stored = self.base_type.convert_to_model(field, value)?;
        if stored.is_null() {
            return Ok(stored);
        }
        self.check_allowed(field, &stored)?;
        Ok(stored)
    }

    fn convert_from_model(&self, field: &str, stored: &Value) -> Result<FieldValue, FieldError> {
        if !stored.is_null() {
            self.check_allowed(field, stored)?;
        }
        self.base_type.convert_from_model(field, stored)
    }
}
