//! Parameter plumbing between compiled criteria and tokio-postgres
//!
//! The criteria compiler emits `?` placeholders; Postgres wants `$1, $2, ...`.
//! Literal values are bound through [`SqlParam`], which encodes each literal for
//! whatever parameter type the server inferred from the surrounding clause.

use crate::criteria::{LiteralValue, Numeric};
use bytes::BytesMut;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// Rewrite `?` placeholders to `$first, $first+1, ...`
///
/// Placeholders inside single-quoted SQL strings (the inlined JSON probes) are left
/// alone. Returns the rewritten clause and the next unused placeholder number.
pub fn number_placeholders(clause: &str, first: usize) -> (String, usize) {
    let mut out = String::with_capacity(clause.len() + 8);
    let mut next = first;
    let mut quoted = false;

    for c in clause.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                out.push(c);
            }
            '?' if !quoted => {
                out.push('$');
                out.push_str(&next.to_string());
                next += 1;
            }
            _ => out.push(c),
        }
    }
    (out, next)
}

/// A criteria literal bound as a statement parameter
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a LiteralValue);

impl SqlParam<'_> {
    fn text(&self) -> Result<String, BoxError> {
        Ok(match self.0 {
            LiteralValue::Null => String::new(),
            LiteralValue::Bool(b) => b.to_string(),
            LiteralValue::Number(Numeric::Int(i)) => i.to_string(),
            LiteralValue::Number(Numeric::UInt(u)) => u.to_string(),
            LiteralValue::Number(Numeric::Float(f)) => f.to_string(),
            LiteralValue::String(s) => s.clone(),
            LiteralValue::Uuid(id) => id.to_string(),
            LiteralValue::StringList(_) => {
                return Err("a string list cannot be bound as a text parameter".into())
            }
        })
    }

    fn integer(&self) -> Result<i64, BoxError> {
        match self.0 {
            LiteralValue::Number(Numeric::Int(i)) => Ok(*i),
            LiteralValue::Number(Numeric::UInt(u)) => Ok(i64::try_from(*u)?),
            LiteralValue::Number(Numeric::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Ok(*f as i64)
            }
            other => Err(format!("cannot bind {} literal as an integer", other.type_name()).into()),
        }
    }

    fn float(&self) -> Result<f64, BoxError> {
        match self.0 {
            LiteralValue::Number(n) => Ok(n.as_f64()),
            other => Err(format!("cannot bind {} literal as a float", other.type_name()).into()),
        }
    }

    fn uuid(&self) -> Result<Uuid, BoxError> {
        match self.0 {
            LiteralValue::Uuid(id) => Ok(*id),
            LiteralValue::String(s) => Ok(Uuid::parse_str(s)?),
            other => Err(format!("cannot bind {} literal as a uuid", other.type_name()).into()),
        }
    }
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

impl ToSql for SqlParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if matches!(self.0, LiteralValue::Null) {
            return Ok(IsNull::Yes);
        }
        if is_text(ty) {
            return self.text()?.as_str().to_sql(ty, out);
        }

        match *ty {
            Type::BOOL => match self.0 {
                LiteralValue::Bool(b) => b.to_sql(ty, out),
                other => Err(format!("cannot bind {} literal as a boolean", other.type_name()).into()),
            },
            Type::INT2 => i16::try_from(self.integer()?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(self.integer()?)?.to_sql(ty, out),
            Type::INT8 => self.integer()?.to_sql(ty, out),
            Type::FLOAT4 => (self.float()? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.float()?.to_sql(ty, out),
            Type::UUID => self.uuid()?.to_sql(ty, out),
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => match self.0 {
                LiteralValue::StringList(items) => items.to_sql(ty, out),
                other => Err(format!("cannot bind {} literal as an array", other.type_name()).into()),
            },
            _ => Err(format!(
                "cannot bind {} literal to parameter of type {}",
                self.0.type_name(),
                ty
            )
            .into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_numbered_in_order() {
        let (sql, next) = number_placeholders("((type = ?) and (number = ?))", 1);
        assert_eq!(sql, "((type = $1) and (number = $2))");
        assert_eq!(next, 3);
    }

    #[test]
    fn test_placeholders_inside_quotes_untouched() {
        let clause = r#"((space_id = ?) and (Fields@>'{"what?" : "really?"}'))"#;
        let (sql, next) = number_placeholders(clause, 4);
        assert_eq!(sql, r#"((space_id = $4) and (Fields@>'{"what?" : "really?"}'))"#);
        assert_eq!(next, 5);
    }

    #[test]
    fn test_doubled_quotes_stay_quoted() {
        let clause = r#"((Fields@>'{"t" : "it''s?"}') and (id = ?))"#;
        let (sql, _) = number_placeholders(clause, 1);
        assert_eq!(sql, r#"((Fields@>'{"t" : "it''s?"}') and (id = $1))"#);
    }

    fn encode(value: LiteralValue, ty: &Type) -> Result<BytesMut, BoxError> {
        let mut out = BytesMut::new();
        SqlParam(&value).to_sql(ty, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(encode(LiteralValue::from(7i64), &Type::INT8).unwrap().len(), 8);
        assert_eq!(encode(LiteralValue::from(7i64), &Type::INT4).unwrap().len(), 4);
        assert!(encode(LiteralValue::from(i64::MAX), &Type::INT4).is_err());
        assert!(encode(LiteralValue::from(u64::MAX), &Type::INT8).is_err());
    }

    #[test]
    fn test_string_bound_to_uuid_column() {
        let id = Uuid::new_v4();
        let encoded = encode(LiteralValue::from(id.to_string()), &Type::UUID).unwrap();
        assert_eq!(&encoded[..], id.as_bytes());
        assert!(encode(LiteralValue::from("not-a-uuid"), &Type::UUID).is_err());
    }

    #[test]
    fn test_text_rendering() {
        let encoded = encode(LiteralValue::Bool(true), &Type::TEXT).unwrap();
        assert_eq!(&encoded[..], b"true");
    }

    #[test]
    fn test_null_is_null() {
        let mut out = BytesMut::new();
        let result = SqlParam(&LiteralValue::Null).to_sql(&Type::UUID, &mut out).unwrap();
        assert!(matches!(result, IsNull::Yes));
    }

    #[test]
    fn test_mismatched_binding_rejected() {
        assert!(encode(LiteralValue::from("x"), &Type::BOOL).is_err());
        assert!(encode(LiteralValue::from("x"), &Type::JSONB).is_err());
    }
}
