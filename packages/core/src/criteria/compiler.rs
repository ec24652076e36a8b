//! Criteria → SQL compilation
//!
//! Compilation is two pure passes over a borrowed tree:
//!
//! 1. [`annotate`] walks the tree post-order and records which nodes live in JSON
//!    context: fields that are not native columns, and `Equals`/`Not` nodes with a
//!    JSON operand. The result is a side table keyed by node address.
//! 2. An emission visitor reads that table and builds the clause. Column literals are
//!    always bound as `?` parameters; JSON literals are rendered into the containment
//!    probe so they can match the stored document textually.
//!
//! Errors never stop compilation. Every node that cannot be compiled records one
//! error and yields no fragment, and the caller gets the complete list at once.

use super::{Expression, ExpressionVisitor, LiteralValue, Numeric};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// JSONB column holding the work item's field document
pub const JSON_COLUMN: &str = "Fields";

/// Native column for a criteria field name, `None` for JSON-embedded fields
pub fn column_name(field: &str) -> Option<&'static str> {
    match field {
        "ID" => Some("id"),
        "Type" => Some("type"),
        "Version" => Some("version"),
        "Number" => Some("number"),
        "SpaceID" => Some("space_id"),
        _ => None,
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("field name {field:?} must not contain quote characters")]
    QuoteInFieldName { field: String },

    #[error("parameter expressions are not supported")]
    UnsupportedParameter,

    #[error("JSON field '{field}' can only be used as an operand of a comparison")]
    JsonFieldOutsideComparison { field: String },

    #[error("{operator} on a JSON field requires one field and one literal operand")]
    InvalidJsonOperands { operator: &'static str },

    #[error("cannot render {value_type} literal in JSON context: {reason}")]
    UnrenderableLiteral {
        value_type: &'static str,
        reason: String,
    },
}

/// All errors collected while compiling one expression
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", join_errors(.0))]
pub struct CompileErrors(pub Vec<CompileError>);

fn join_errors(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Node identities that compile in JSON context
#[derive(Debug, Default)]
pub struct JsonContext {
    nodes: HashSet<usize>,
}

impl JsonContext {
    fn key(node: &Expression) -> usize {
        node as *const Expression as usize
    }

    pub fn is_json(&self, node: &Expression) -> bool {
        self.nodes.contains(&Self::key(node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Record the JSON-context nodes of `expr` without touching the tree
pub fn annotate(expr: &Expression) -> JsonContext {
    let mut ctx = JsonContext::default();
    for node in expr.post_order() {
        let json = match node {
            Expression::Field(name) => column_name(name).is_none(),
            Expression::Equals(l, r) | Expression::Not(l, r) => ctx.is_json(l) || ctx.is_json(r),
            _ => false,
        };
        if json {
            ctx.nodes.insert(JsonContext::key(node));
        }
    }
    ctx
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub where_clause: String,
    pub parameters: Vec<LiteralValue>,
    pub errors: Vec<CompileError>,
}

impl CompiledQuery {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The clause and its parameters, or every error if any node failed
    pub fn into_result(self) -> Result<(String, Vec<LiteralValue>), CompileErrors> {
        if self.errors.is_empty() {
            Ok((self.where_clause, self.parameters))
        } else {
            Err(CompileErrors(self.errors))
        }
    }
}

pub fn compile(expr: &Expression) -> CompiledQuery {
    let ctx = annotate(expr);
    let mut emitter = Emitter {
        ctx: &ctx,
        parameters: Vec::new(),
        errors: Vec::new(),
        json_operand: false,
    };
    let clause = expr.accept(&mut emitter);

    CompiledQuery {
        where_clause: clause.unwrap_or_default(),
        parameters: emitter.parameters,
        errors: emitter.errors,
    }
}

struct Emitter<'a> {
    ctx: &'a JsonContext,
    parameters: Vec<LiteralValue>,
    errors: Vec<CompileError>,
    /// Set while emitting the operands of a JSON containment probe
    json_operand: bool,
}

impl Emitter<'_> {
    fn fail(&mut self, error: CompileError) -> Option<String> {
        self.errors.push(error);
        None
    }

    fn check_field_name(&mut self, name: &str) -> bool {
        if name.contains('\'') || name.contains('"') {
            self.errors.push(CompileError::QuoteInFieldName {
                field: name.to_string(),
            });
            return false;
        }
        true
    }

    fn binary(
        &mut self,
        left: &Expression,
        right: &Expression,
        operator: &str,
    ) -> Option<String> {
        let l = left.accept(self);
        let r = right.accept(self);
        Some(format!("({} {} {})", l?, operator, r?))
    }

    /// `(Fields@>'{"name" : <json>}')` for a (JSON field, literal) operand pair
    fn json_containment(
        &mut self,
        left: &Expression,
        right: &Expression,
        operator: &'static str,
    ) -> Option<String> {
        let (field, literal) = match (left, right) {
            (Expression::Field(_), Expression::Literal(_)) => (left, right),
            (Expression::Literal(_), Expression::Field(_)) => (right, left),
            _ => return self.fail(CompileError::InvalidJsonOperands { operator }),
        };

        self.json_operand = true;
        let opener = field.accept(self);
        let value = literal.accept(self);
        self.json_operand = false;

        Some(format!("({} : {})", opener?, value?))
    }
}

impl ExpressionVisitor for Emitter<'_> {
    type Output = Option<String>;

    fn visit_field(&mut self, _node: &Expression, name: &str) -> Self::Output {
        if !self.check_field_name(name) {
            return None;
        }
        match column_name(name) {
            Some(column) => Some(column.to_string()),
            None if self.json_operand => Some(format!("{}@>'{{{}", JSON_COLUMN, json_key(name))),
            None => self.fail(CompileError::JsonFieldOutsideComparison {
                field: name.to_string(),
            }),
        }
    }

    fn visit_literal(&mut self, _node: &Expression, value: &LiteralValue) -> Self::Output {
        if self.json_operand {
            return match render_json_literal(value) {
                Ok(json) => Some(format!("{}}}'", json)),
                Err(reason) => self.fail(CompileError::UnrenderableLiteral {
                    value_type: value.type_name(),
                    reason,
                }),
            };
        }
        self.parameters.push(value.clone());
        Some("?".to_string())
    }

    fn visit_parameter(&mut self, _node: &Expression) -> Self::Output {
        self.fail(CompileError::UnsupportedParameter)
    }

    fn visit_equals(&mut self, node: &Expression, left: &Expression, right: &Expression) -> Self::Output {
        if self.ctx.is_json(node) {
            return self.json_containment(left, right, "Equals");
        }
        self.binary(left, right, "=")
    }

    fn visit_not(&mut self, node: &Expression, left: &Expression, right: &Expression) -> Self::Output {
        if self.ctx.is_json(node) {
            let clause = self.json_containment(left, right, "Not")?;
            return Some(format!("NOT {}", clause));
        }
        self.binary(left, right, "!=")
    }

    fn visit_and(&mut self, _node: &Expression, left: &Expression, right: &Expression) -> Self::Output {
        self.binary(left, right, "and")
    }

    fn visit_or(&mut self, _node: &Expression, left: &Expression, right: &Expression) -> Self::Output {
        self.binary(left, right, "or")
    }

    fn visit_is_null(&mut self, _node: &Expression, name: &str) -> Self::Output {
        if !self.check_field_name(name) {
            return None;
        }
        match column_name(name) {
            Some(column) => Some(format!("({} IS NULL)", column)),
            None => Some(format!("({}->>'{}' IS NULL)", JSON_COLUMN, name)),
        }
    }
}

/// Escaped JSON object key, so backslashes and control characters stay valid JSONB
fn json_key(name: &str) -> String {
    serde_json::Value::from(name).to_string().replace('\'', "''")
}

/// JSON text of a literal as it appears inside a single-quoted SQL string
fn render_json_literal(value: &LiteralValue) -> Result<String, String> {
    let json = match value {
        LiteralValue::Null => {
            return Err("null cannot be matched by containment, use IsNull".to_string())
        }
        LiteralValue::Bool(b) => b.to_string(),
        LiteralValue::Number(Numeric::Int(i)) => i.to_string(),
        LiteralValue::Number(Numeric::UInt(u)) => u.to_string(),
        LiteralValue::Number(Numeric::Float(f)) if f.is_finite() => f.to_string(),
        LiteralValue::Number(Numeric::Float(f)) => return Err(format!("{} is not finite", f)),
        LiteralValue::String(s) => serde_json::to_string(s).map_err(|e| e.to_string())?,
        LiteralValue::Uuid(id) => format!("\"{}\"", id),
        LiteralValue::StringList(items) => serde_json::to_string(items).map_err(|e| e.to_string())?,
    };
    Ok(json.replace('\'', "''"))
}

/// Criteria scoped to a single space
///
/// The space predicate is always the leftmost conjunct, so no caller-supplied
/// criteria can widen a scan past the space.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceFilter {
    space_id: Uuid,
    expression: Expression,
    where_clause: String,
    parameters: Vec<LiteralValue>,
}

impl SpaceFilter {
    pub fn compile(space_id: Uuid, criteria: Option<Expression>) -> Result<Self, CompileErrors> {
        let scope = Expression::equals(Expression::field("SpaceID"), Expression::literal(space_id));
        let expression = match criteria {
            Some(criteria) => Expression::and(scope, criteria),
            None => scope,
        };
        let (where_clause, parameters) = compile(&expression).into_result()?;
        Ok(Self {
            space_id,
            expression,
            where_clause,
            parameters,
        })
    }

    pub fn space_id(&self) -> Uuid {
        self.space_id
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    pub fn parameters(&self) -> &[LiteralValue] {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Expression as E;

    fn ok(expr: &Expression) -> (String, Vec<LiteralValue>) {
        compile(expr).into_result().expect("expression should compile")
    }

    // ========================================================================
    // Column vs JSON
    // ========================================================================

    #[test]
    fn test_column_equals_binds_parameter() {
        let (clause, params) = ok(&E::equals(E::field("Type"), E::literal("abcd")));
        assert_eq!(clause, "(type = ?)");
        assert_eq!(params, vec![LiteralValue::from("abcd")]);
    }

    #[test]
    fn test_json_equals_inlines_literal() {
        let (clause, params) = ok(&E::equals(E::field("foo"), E::literal(23i64)));
        assert_eq!(clause, r#"(Fields@>'{"foo" : 23}')"#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_reversed_json_operands_normalised() {
        let (clause, _) = ok(&E::equals(E::literal("x"), E::field("foo")));
        assert_eq!(clause, r#"(Fields@>'{"foo" : "x"}')"#);
    }

    // ========================================================================
    // Negation, composition, null checks
    // ========================================================================

    #[test]
    fn test_column_not() {
        let (clause, params) = ok(&E::not(E::field("Type"), E::literal("abcd")));
        assert_eq!(clause, "(type != ?)");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_json_not() {
        let (clause, params) = ok(&E::not(E::field("foo"), E::literal("abcd")));
        assert_eq!(clause, r#"NOT (Fields@>'{"foo" : "abcd"}')"#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_composition_keeps_parameter_order() {
        let expr = E::and(
            E::equals(E::field("foo"), E::literal("x")),
            E::equals(E::literal(true), E::literal(false)),
        );
        let (clause, params) = ok(&expr);
        assert_eq!(clause, r#"((Fields@>'{"foo" : "x"}') and (? = ?))"#);
        assert_eq!(params, vec![LiteralValue::Bool(true), LiteralValue::Bool(false)]);
    }

    #[test]
    fn test_or_composition() {
        let expr = E::or(
            E::equals(E::field("Number"), E::literal(1i64)),
            E::equals(E::field("Number"), E::literal(2i64)),
        );
        let (clause, params) = ok(&expr);
        assert_eq!(clause, "((number = ?) or (number = ?))");
        assert_eq!(params, vec![LiteralValue::from(1i64), LiteralValue::from(2i64)]);
    }

    #[test]
    fn test_is_null() {
        assert_eq!(ok(&E::is_null("system.assignees")).0, "(Fields->>'system.assignees' IS NULL)");
        assert_eq!(ok(&E::is_null("ID")).0, "(id IS NULL)");
    }

    // ========================================================================
    // Literal rendering
    // ========================================================================

    #[test]
    fn test_string_list_literal() {
        let (clause, _) = ok(&E::equals(E::field("system.assignees"), E::literal(vec!["1", "2", "3"])));
        assert_eq!(clause, r#"(Fields@>'{"system.assignees" : ["1","2","3"]}')"#);
    }

    #[test]
    fn test_numeric_literals_keep_their_text() {
        assert_eq!(ok(&E::equals(E::field("f"), E::literal(u64::MAX))).0,
            format!(r#"(Fields@>'{{"f" : {}}}')"#, u64::MAX));
        assert_eq!(ok(&E::equals(E::field("f"), E::literal(-7i64))).0, r#"(Fields@>'{"f" : -7}')"#);
        assert_eq!(ok(&E::equals(E::field("f"), E::literal(2.5f64))).0, r#"(Fields@>'{"f" : 2.5}')"#);
    }

    #[test]
    fn test_uuid_and_bool_literals() {
        let id = Uuid::new_v4();
        assert_eq!(
            ok(&E::equals(E::field("owner"), E::literal(id))).0,
            format!(r#"(Fields@>'{{"owner" : "{}"}}')"#, id)
        );
        assert_eq!(ok(&E::equals(E::field("flag"), E::literal(true))).0, r#"(Fields@>'{"flag" : true}')"#);
    }

    #[test]
    fn test_single_quote_in_json_string_is_doubled() {
        let (clause, _) = ok(&E::equals(E::field("title"), E::literal("it's")));
        assert_eq!(clause, r#"(Fields@>'{"title" : "it''s"}')"#);
    }

    #[test]
    fn test_non_finite_and_null_json_literals_rejected() {
        let result = compile(&E::equals(E::field("f"), E::literal(f64::INFINITY)));
        assert!(matches!(result.errors.as_slice(), [CompileError::UnrenderableLiteral { .. }]));

        let result = compile(&E::equals(E::field("f"), E::Literal(LiteralValue::Null)));
        assert_eq!(result.errors.len(), 1);
    }

    // ========================================================================
    // Failure
    // ========================================================================

    #[test]
    fn test_quote_in_field_name_rejected() {
        let result = compile(&E::equals(E::field("foo'bar"), E::literal("x")));
        assert_eq!(
            result.errors,
            vec![CompileError::QuoteInFieldName { field: "foo'bar".to_string() }]
        );
        assert!(result.where_clause.is_empty());

        let result = compile(&E::is_null("a\"b"));
        assert_eq!(result.errors.len(), 1);
        assert!(result.where_clause.is_empty());
    }

    #[test]
    fn test_escapable_field_names_render_valid_json() {
        for name in ["a\\", "a\tb", "line\nbreak"] {
            let (clause, params) = ok(&E::equals(E::field(name), E::literal(1i64)));
            assert!(params.is_empty());

            let body = clause
                .strip_prefix("(Fields@>'")
                .and_then(|rest| rest.strip_suffix("')"))
                .expect("containment clause");
            let parsed: serde_json::Value =
                serde_json::from_str(body).expect("valid JSON body");
            assert_eq!(parsed, serde_json::json!({ name: 1 }));
        }
    }

    #[test]
    fn test_parameter_always_rejected() {
        let result = compile(&E::equals(E::field("Type"), E::Parameter));
        assert_eq!(result.errors, vec![CompileError::UnsupportedParameter]);
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_errors_accumulate_across_branches() {
        let expr = E::and(
            E::equals(E::field("bad'name"), E::literal(1i64)),
            E::or(E::Parameter, E::equals(E::field("a"), E::field("b"))),
        );
        let result = compile(&expr);
        assert_eq!(result.errors.len(), 3);
        let message = result.into_result().unwrap_err().to_string();
        assert_eq!(message.matches("; ").count(), 2);
    }

    #[test]
    fn test_json_field_outside_comparison_rejected() {
        let result = compile(&E::and(E::field("foo"), E::equals(E::field("ID"), E::literal("x"))));
        assert!(matches!(
            result.errors.as_slice(),
            [CompileError::JsonFieldOutsideComparison { field }] if field == "foo"
        ));
    }

    // ========================================================================
    // Annotation and scoping
    // ========================================================================

    #[test]
    fn test_annotation_marks_json_nodes_only() {
        let expr = E::and(
            E::equals(E::field("foo"), E::literal("x")),
            E::equals(E::field("ID"), E::literal("y")),
        );
        let ctx = annotate(&expr);
        // "foo" and its Equals
        assert_eq!(ctx.len(), 2);
        assert!(!ctx.is_json(&expr));
        if let Expression::And(left, right) = &expr {
            assert!(ctx.is_json(left));
            assert!(!ctx.is_json(right));
        }
    }

    #[test]
    fn test_same_tree_compiles_identically_twice() {
        let expr = E::and(
            E::not(E::field("foo"), E::literal("x")),
            E::equals(E::field("Version"), E::literal(3i64)),
        );
        assert_eq!(compile(&expr), compile(&expr));
    }

    #[test]
    fn test_space_filter_prefixes_scope() {
        let space = Uuid::new_v4();
        let filter = SpaceFilter::compile(space, Some(E::equals(E::field("foo"), E::literal("x")))).unwrap();
        assert_eq!(filter.where_clause(), r#"((space_id = ?) and (Fields@>'{"foo" : "x"}'))"#);
        assert_eq!(filter.parameters(), &[LiteralValue::Uuid(space)]);

        let unscoped = SpaceFilter::compile(space, None).unwrap();
        assert_eq!(unscoped.where_clause(), "(space_id = ?)");

        assert!(SpaceFilter::compile(space, Some(E::Parameter)).is_err());
    }
}
