use super::{FieldConverter, FieldError, FieldValue, Kind, SimpleType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A homogeneous sequence of values of one simple component type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListType {
    pub component_type: SimpleType,
}

impl ListType {
    pub fn new(component_type: SimpleType) -> Self {
        Self { component_type }
    }

    fn element_error(field: &str, index: usize, source: FieldError) -> FieldError {
        FieldError::InvalidElement {
            field: field.to_string(),
            index,
            source: Box::new(source),
        }
    }
}

impl FieldConverter for ListType {
    fn kind(&self) -> Kind {
        Kind::List
    }

    fn convert_to_model(&self, field: &str, value: &FieldValue) -> Result<Value, FieldError> {
        let items = match value {
            FieldValue::Null => return Ok(Value::Null),
            FieldValue::List(items) => items,
            other => return Err(FieldError::kind_mismatch(field, Kind::List, other)),
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.component_type
                    .convert_to_model(field, item)
                    .map_err(|e| Self::element_error(field, index, e))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn convert_from_model(&self, field: &str, stored: &Value) -> Result<FieldValue, FieldError> {
        let items = match stored {
            Value::Null => return Ok(FieldValue::Null),
            Value::Array(items) => items,
            _ => return Err(FieldError::corrupt(field, Kind::List, stored)),
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.component_type
                    .convert_from_model(field, item)
                    .map_err(|e| Self::element_error(field, index, e))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::List)
    }
}
