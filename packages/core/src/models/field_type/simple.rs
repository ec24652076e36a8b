use super::{FieldConverter, FieldError, FieldValue, Kind};
use crate::models::markup::{CodebaseContent, MarkupContent};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A field holding a single value of one primitive [`Kind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleType {
    pub kind: Kind,
}

impl SimpleType {
    pub fn new(kind: Kind) -> Self {
        Self { kind }
    }
}

impl FieldConverter for SimpleType {
    fn kind(&self) -> Kind {
        self.kind
    }

    fn convert_to_model(&self, field: &str, value: &FieldValue) -> Result<Value, FieldError> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match (self.kind, value) {
            (Kind::String | Kind::User | Kind::Iteration | Kind::Area, FieldValue::String(s)) => {
                Ok(Value::String(s.clone()))
            }
            (Kind::Url, FieldValue::String(s)) => {
                if is_valid_url(s) {
                    Ok(Value::String(s.clone()))
                } else {
                    Err(FieldError::InvalidUrl {
                        field: field.to_string(),
                        value: s.clone(),
                    })
                }
            }
            (Kind::Float, FieldValue::Float(f)) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| FieldError::invalid_value(field, f.to_string(), "float must be finite")),
            // JSON decoders cannot tell 5 from 5.0, so whole numbers are widened
            (Kind::Float, FieldValue::Integer(i)) => serde_json::Number::from_f64(*i as f64)
                .map(Value::Number)
                .ok_or_else(|| FieldError::invalid_value(field, i.to_string(), "float must be finite")),
            (Kind::Integer | Kind::Duration, FieldValue::Integer(i)) => Ok(Value::from(*i)),
            (Kind::Instant, FieldValue::Instant(t)) => t
                .timestamp_nanos_opt()
                .map(Value::from)
                .ok_or_else(|| {
                    FieldError::invalid_value(field, t.to_rfc3339(), "instant out of range")
                }),
            (Kind::WorkItemReference, FieldValue::String(s)) => parse_reference(s)
                .map(Value::from)
                .ok_or_else(|| {
                    FieldError::invalid_value(field, s.clone(), "not a decimal work item number")
                }),
            (Kind::Markup, FieldValue::Markup(m)) => Ok(Value::Object(m.to_map())),
            (Kind::Codebase, FieldValue::Codebase(c)) => {
                if c.repository.trim().is_empty() {
                    return Err(FieldError::invalid_value(
                        field,
                        value.to_string(),
                        "codebase repository must not be empty",
                    ));
                }
                Ok(Value::Object(c.to_map()))
            }
            (Kind::Enum | Kind::List, _) => Err(FieldError::UnsupportedKind {
                field: field.to_string(),
                kind: self.kind,
            }),
            (expected, other) => Err(FieldError::kind_mismatch(field, expected, other)),
        }
    }

    fn convert_from_model(&self, field: &str, stored: &Value) -> Result<FieldValue, FieldError> {
        if stored.is_null() {
            return Ok(FieldValue::Null);
        }

        let corrupt = || FieldError::corrupt(field, self.kind, stored);
        match self.kind {
            Kind::String | Kind::User | Kind::Iteration | Kind::Area | Kind::Url => stored
                .as_str()
                .map(|s| FieldValue::String(s.to_string()))
                .ok_or_else(corrupt),
            Kind::Float => stored.as_f64().map(FieldValue::Float).ok_or_else(corrupt),
            Kind::Integer | Kind::Duration => {
                stored.as_i64().map(FieldValue::Integer).ok_or_else(corrupt)
            }
            Kind::Instant => stored
                .as_i64()
                .map(|nanos| FieldValue::Instant(DateTime::from_timestamp_nanos(nanos)))
                .ok_or_else(corrupt),
            Kind::WorkItemReference => stored
                .as_u64()
                .map(|number| FieldValue::String(number.to_string()))
                .ok_or_else(corrupt),
            Kind::Markup => match stored {
                Value::Object(map) => Ok(FieldValue::Markup(MarkupContent::from_map(map))),
                Value::String(s) => Ok(FieldValue::Markup(MarkupContent::plain_text(s.clone()))),
                _ => Err(corrupt()),
            },
            Kind::Codebase => match stored {
                Value::Object(map) => CodebaseContent::from_map(map)
                    .map(FieldValue::Codebase)
                    .map_err(|_| corrupt()),
                _ => Err(corrupt()),
            },
            Kind::Enum | Kind::List => Err(FieldError::UnsupportedKind {
                field: field.to_string(),
                kind: self.kind,
            }),
        }
    }
}

/// Absolute URL with a host, e.g. `https://example.com/a?b=c`
fn is_valid_url(candidate: &str) -> bool {
    match url::Url::parse(candidate.trim()) {
        Ok(parsed) => parsed.has_host(),
        Err(_) => false,
    }
}

fn parse_reference(candidate: &str) -> Option<u64> {
    if candidate.is_empty() || !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    candidate.parse().ok()
}
