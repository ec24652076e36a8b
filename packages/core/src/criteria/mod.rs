//! Criteria Expressions
//!
//! A small boolean expression language for filtering work items. The same tree is
//! compiled to a parameterized SQL `WHERE` clause by [`compiler`] and evaluated
//! directly against records by [`matcher`].
//!
//! Field references name either a native column (`ID`, `Type`, `Version`, `Number`,
//! `SpaceID`) or a key of the work item's JSON `Fields` document. The distinction
//! switches the emitted operators: column comparisons bind parameters, JSON
//! comparisons become JSONB containment probes.
//!
//! # Examples
//!
//! ```rust
//! use witrack_core::criteria::{compile, Expression};
//!
//! let expr = Expression::and(
//!     Expression::equals(Expression::field("system.state"), Expression::literal("open")),
//!     Expression::equals(Expression::field("Number"), Expression::literal(7i64)),
//! );
//! let (clause, params) = compile(&expr).into_result().unwrap();
//! assert_eq!(clause, r#"((Fields@>'{"system.state" : "open"}') and (number = ?))"#);
//! assert_eq!(params.len(), 1);
//! ```

pub mod compiler;
pub mod matcher;

pub use compiler::{
    annotate, column_name, compile, CompileError, CompileErrors, CompiledQuery, JsonContext,
    SpaceFilter, JSON_COLUMN,
};
pub use matcher::matches;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric literal, keeping the dynamic type that decides its JSON text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Numeric {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match self {
            Numeric::Int(i) => *i as f64,
            Numeric::UInt(u) => *u as f64,
            Numeric::Float(f) => *f,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Number(Numeric),
    String(String),
    Uuid(Uuid),
    StringList(Vec<String>),
}

impl LiteralValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            LiteralValue::Null => "null",
            LiteralValue::Bool(_) => "boolean",
            LiteralValue::Number(Numeric::Int(_)) => "integer",
            LiteralValue::Number(Numeric::UInt(_)) => "unsigned integer",
            LiteralValue::Number(Numeric::Float(_)) => "float",
            LiteralValue::String(_) => "string",
            LiteralValue::Uuid(_) => "uuid",
            LiteralValue::StringList(_) => "string list",
        }
    }
}

impl From<bool> for LiteralValue {
    fn from(value: bool) -> Self {
        LiteralValue::Bool(value)
    }
}

impl From<i64> for LiteralValue {
    fn from(value: i64) -> Self {
        LiteralValue::Number(Numeric::Int(value))
    }
}

impl From<i32> for LiteralValue {
    fn from(value: i32) -> Self {
        LiteralValue::Number(Numeric::Int(value.into()))
    }
}

impl From<u64> for LiteralValue {
    fn from(value: u64) -> Self {
        LiteralValue::Number(Numeric::UInt(value))
    }
}

impl From<f64> for LiteralValue {
    fn from(value: f64) -> Self {
        LiteralValue::Number(Numeric::Float(value))
    }
}

impl From<&str> for LiteralValue {
    fn from(value: &str) -> Self {
        LiteralValue::String(value.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(value: String) -> Self {
        LiteralValue::String(value)
    }
}

impl From<Uuid> for LiteralValue {
    fn from(value: Uuid) -> Self {
        LiteralValue::Uuid(value)
    }
}

impl From<Vec<String>> for LiteralValue {
    fn from(value: Vec<String>) -> Self {
        LiteralValue::StringList(value)
    }
}

impl From<Vec<&str>> for LiteralValue {
    fn from(value: Vec<&str>) -> Self {
        LiteralValue::StringList(value.into_iter().map(str::to_string).collect())
    }
}

/// Node of a criteria expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Field(String),
    Literal(LiteralValue),
    /// Placeholder for a late-bound value; never compiles
    Parameter,
    Equals(Box<Expression>, Box<Expression>),
    Not(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    IsNull(String),
}

impl Expression {
    pub fn field(name: impl Into<String>) -> Self {
        Expression::Field(name.into())
    }

    pub fn literal(value: impl Into<LiteralValue>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn equals(left: Expression, right: Expression) -> Self {
        Expression::Equals(Box::new(left), Box::new(right))
    }

    pub fn not(left: Expression, right: Expression) -> Self {
        Expression::Not(Box::new(left), Box::new(right))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or(Box::new(left), Box::new(right))
    }

    pub fn is_null(name: impl Into<String>) -> Self {
        Expression::IsNull(name.into())
    }

    pub fn accept<V: ExpressionVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expression::Field(name) => visitor.visit_field(self, name),
            Expression::Literal(value) => visitor.visit_literal(self, value),
            Expression::Parameter => visitor.visit_parameter(self),
            Expression::Equals(l, r) => visitor.visit_equals(self, l, r),
            Expression::Not(l, r) => visitor.visit_not(self, l, r),
            Expression::And(l, r) => visitor.visit_and(self, l, r),
            Expression::Or(l, r) => visitor.visit_or(self, l, r),
            Expression::IsNull(name) => visitor.visit_is_null(self, name),
        }
    }

    pub fn children(&self) -> Option<(&Expression, &Expression)> {
        match self {
            Expression::Equals(l, r)
            | Expression::Not(l, r)
            | Expression::And(l, r)
            | Expression::Or(l, r) => Some((&**l, &**r)),
            _ => None,
        }
    }

    /// Children before parents, left before right
    pub fn post_order(&self) -> PostOrder<'_> {
        PostOrder {
            stack: vec![(self, false)],
        }
    }
}

/// One method per node type; `node` is the visited node itself
pub trait ExpressionVisitor {
    type Output;

    fn visit_field(&mut self, node: &Expression, name: &str) -> Self::Output;
    fn visit_literal(&mut self, node: &Expression, value: &LiteralValue) -> Self::Output;
    fn visit_parameter(&mut self, node: &Expression) -> Self::Output;
    fn visit_equals(&mut self, node: &Expression, left: &Expression, right: &Expression) -> Self::Output;
    fn visit_not(&mut self, node: &Expression, left: &Expression, right: &Expression) -> Self::Output;
    fn visit_and(&mut self, node: &Expression, left: &Expression, right: &Expression) -> Self::Output;
    fn visit_or(&mut self, node: &Expression, left: &Expression, right: &Expression) -> Self::Output;
    fn visit_is_null(&mut self, node: &Expression, name: &str) -> Self::Output;
}

pub struct PostOrder<'a> {
    stack: Vec<(&'a Expression, bool)>,
}

impl<'a> Iterator for PostOrder<'a> {
    type Item = &'a Expression;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, expanded)) = self.stack.pop() {
            match node.children() {
                Some((left, right)) if !expanded => {
                    self.stack.push((node, true));
                    self.stack.push((right, false));
                    self.stack.push((left, false));
                }
                _ => return Some(node),
            }
        }
        None
    }
}
