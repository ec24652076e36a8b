//! In-memory evaluation of criteria expressions
//!
//! Mirrors what the compiled SQL does on Postgres: column comparisons are plain
//! equality, JSON-field comparisons use JSONB containment. Expressions that would not
//! compile never match.

use super::compiler::column_name;
use super::{Expression, LiteralValue, Numeric};
use crate::models::WorkItemRecord;
use serde_json::Value;

pub fn matches(expr: &Expression, record: &WorkItemRecord) -> bool {
    match expr {
        Expression::Equals(l, r) => compare(l, r, record).unwrap_or(false),
        Expression::Not(l, r) => compare(l, r, record).map(|eq| !eq).unwrap_or(false),
        Expression::And(l, r) => matches(l, record) && matches(r, record),
        Expression::Or(l, r) => matches(l, record) || matches(r, record),
        Expression::IsNull(name) => operand(&Expression::Field(name.clone()), record)
            .map(|value| value.is_null())
            .unwrap_or(true),
        Expression::Literal(LiteralValue::Bool(b)) => *b,
        _ => false,
    }
}

/// `None` when either side cannot be evaluated (SQL `NULL`)
fn compare(left: &Expression, right: &Expression, record: &WorkItemRecord) -> Option<bool> {
    let json_side = match (left, right) {
        (Expression::Field(name), Expression::Literal(lit))
        | (Expression::Literal(lit), Expression::Field(name))
            if column_name(name).is_none() =>
        {
            Some((name, lit))
        }
        _ => None,
    };

    if let Some((name, literal)) = json_side {
        let probe = literal_to_json(literal);
        return Some(
            record
                .fields
                .get(name.as_str())
                .map(|stored| contains(stored, &probe))
                .unwrap_or(false),
        );
    }

    let l = operand(left, record)?;
    let r = operand(right, record)?;
    if l.is_null() || r.is_null() {
        return None;
    }
    Some(scalar_eq(&l, &r))
}

fn operand(expr: &Expression, record: &WorkItemRecord) -> Option<Value> {
    match expr {
        Expression::Literal(lit) => Some(literal_to_json(lit)),
        Expression::Field(name) => match column_name(name) {
            Some("id") => Some(Value::String(record.id.to_string())),
            Some("type") => Some(Value::String(record.type_id.to_string())),
            Some("version") => Some(Value::from(record.version)),
            Some("number") => Some(Value::from(record.number)),
            Some("space_id") => Some(Value::String(record.space_id.to_string())),
            Some(_) => None,
            None => record.fields.get(name.as_str()).cloned(),
        },
        _ => None,
    }
}

fn literal_to_json(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Null => Value::Null,
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Number(Numeric::Int(i)) => Value::from(*i),
        LiteralValue::Number(Numeric::UInt(u)) => Value::from(*u),
        LiteralValue::Number(Numeric::Float(f)) => Value::from(*f),
        LiteralValue::String(s) => Value::String(s.clone()),
        LiteralValue::Uuid(id) => Value::String(id.to_string()),
        LiteralValue::StringList(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
    }
}

/// JSONB `@>` below the top level: objects by key, arrays by subset, scalars by value
fn contains(stored: &Value, probe: &Value) -> bool {
    match (stored, probe) {
        (Value::Object(stored), Value::Object(probe)) => probe.iter().all(|(key, value)| {
            stored
                .get(key)
                .map(|candidate| contains(candidate, value))
                .unwrap_or(false)
        }),
        (Value::Array(stored), Value::Array(probe)) => probe
            .iter()
            .all(|wanted| stored.iter().any(|candidate| contains(candidate, wanted))),
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        (Value::Object(_), _) | (_, Value::Object(_)) => false,
        _ => scalar_eq(stored, probe),
    }
}

fn scalar_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}
