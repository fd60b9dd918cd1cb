use core::fmt;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::{Scope, VariableContext};
use crate::ast::{AccessPath, BinaryOperator, Expression, Literal, UnaryOperator};
use crate::parser::ParseError;

/// Runtime value union.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    #[default]
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("unknown member `{member}` in `{path}`")]
    UnknownMember { path: String, member: String },
    #[error("`{path}` is not a map, cannot access `{member}`")]
    NotAMap { path: String, member: String },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Failure of a rule condition or trigger. Caught per rule by the engine:
/// the rule is skipped, siblings still evaluate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("condition evaluated to a non-boolean value: {0:?}")]
    NotBoolean(Value),
}

pub struct ExpressionEvaluator;

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates a rule condition against the read-only variable context.
    /// Pure: neither the context nor any agent is touched.
    pub fn evaluate_condition(
        &self,
        expr: &Expression,
        vars: &VariableContext,
    ) -> Result<bool, ConditionError> {
        self.evaluate_guard(expr, &Scope::read_only(vars))
    }

    /// Boolean evaluation in an arbitrary scope; used for `if` guards
    /// inside actions, where the state/memory snapshot is visible.
    pub fn evaluate_guard(
        &self,
        expr: &Expression,
        scope: &Scope,
    ) -> Result<bool, ConditionError> {
        match self.eval_expression(expr, scope)? {
            Value::Boolean(held) => Ok(held),
            other => Err(ConditionError::NotBoolean(other)),
        }
    }

    pub fn eval_expression(&self, expr: &Expression, scope: &Scope) -> EvalResult<Value> {
        match expr {
            Expression::Literal(lit) => Ok(Value::from(lit)),
            Expression::Variable(name) => self.resolve_root(name, scope),
            Expression::MemberAccess(path) => self.eval_member_access(path, scope),
            Expression::UnaryOp { op, operand } => self.eval_unary_op(*op, operand, scope),
            Expression::BinaryOp { op, left, right } => {
                self.eval_binary_op(*op, left, right, scope)
            }
        }
    }

    fn resolve_root(&self, name: &str, scope: &Scope) -> EvalResult<Value> {
        if name == "state" {
            if let Some(state) = scope.state {
                return Ok(state.clone().map(Value::String).unwrap_or(Value::Null));
            }
        }
        if name == "memory" && scope.memory.is_some() {
            return Err(EvalError::TypeMismatch(
                "memory is not a value, access it as memory.<field>".to_string(),
            ));
        }
        scope
            .vars
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownIdentifier(name.to_string()))
    }

    fn eval_member_access(&self, path: &AccessPath, scope: &Scope) -> EvalResult<Value> {
        let root = match path.0.first() {
            Some(root) => root,
            None => return Err(EvalError::UnknownIdentifier(path.to_string())),
        };

        // `memory.<field>`: an absent key reads as null; arithmetic on it
        // then fails with a clear type error instead of a sentinel leak.
        if root == "memory" {
            if let Some(memory) = scope.memory {
                let key = match path.0.get(1) {
                    Some(key) => key,
                    None => {
                        return Err(EvalError::TypeMismatch(
                            "memory access requires a field name".to_string(),
                        ))
                    }
                };
                let mut value = memory.get(key).cloned().unwrap_or(Value::Null);
                for member in &path.0[2..] {
                    value = self.member(value, path, member.as_str())?;
                }
                return Ok(value);
            }
            // Conditions carry no memory binding; fall through to the
            // variable context, which reports the unknown identifier.
        }

        let mut value = self.resolve_root(root, scope)?;
        for member in &path.0[1..] {
            value = self.member(value, path, member.as_str())?;
        }
        Ok(value)
    }

    fn member(&self, value: Value, path: &AccessPath, member: &str) -> EvalResult<Value> {
        match value {
            Value::Map(mut map) => map.remove(member).ok_or_else(|| EvalError::UnknownMember {
                path: path.to_string(),
                member: member.to_string(),
            }),
            _ => Err(EvalError::NotAMap {
                path: path.to_string(),
                member: member.to_string(),
            }),
        }
    }

    fn eval_unary_op(
        &self,
        op: UnaryOperator,
        operand: &Expression,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let value = self.eval_expression(operand, scope)?;
        match (op, value) {
            (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            (UnaryOperator::Negate, Value::Integer(i)) => Ok(Value::Integer(-i)),
            (UnaryOperator::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
            (op, value) => Err(EvalError::TypeMismatch(format!("{:?} {:?}", op, value))),
        }
    }

    fn eval_binary_op(
        &self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        scope: &Scope,
    ) -> EvalResult<Value> {
        // `and`/`or` short-circuit: the right operand is not evaluated
        // when the left already decides the result.
        if matches!(op, BinaryOperator::And | BinaryOperator::Or) {
            return self.eval_logical(op, left, right, scope);
        }

        let left_val = self.eval_expression(left, scope)?;
        let right_val = self.eval_expression(right, scope)?;

        match op {
            BinaryOperator::Add => self.eval_add(&left_val, &right_val),
            BinaryOperator::Subtract => self.eval_subtract(&left_val, &right_val),
            BinaryOperator::Multiply => self.eval_multiply(&left_val, &right_val),
            BinaryOperator::Divide => self.eval_divide(&left_val, &right_val),
            BinaryOperator::Equal => Ok(Value::Boolean(left_val == right_val)),
            BinaryOperator::NotEqual => Ok(Value::Boolean(left_val != right_val)),
            BinaryOperator::LessThan => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_lt())
            }
            BinaryOperator::GreaterThan => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_gt())
            }
            BinaryOperator::LessThanEqual => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_le())
            }
            BinaryOperator::GreaterThanEqual => {
                self.compare_values(&left_val, &right_val, |ordering| ordering.is_ge())
            }
            BinaryOperator::In => self.eval_in(&left_val, &right_val),
            BinaryOperator::NotIn => match self.eval_in(&left_val, &right_val)? {
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                other => Err(EvalError::TypeMismatch(format!("not in: {:?}", other))),
            },
            BinaryOperator::And | BinaryOperator::Or => unreachable!(),
        }
    }

    fn eval_logical(
        &self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        scope: &Scope,
    ) -> EvalResult<Value> {
        let left_val = match self.eval_expression(left, scope)? {
            Value::Boolean(b) => b,
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "{:?} is not a boolean",
                    other
                )))
            }
        };
        match (op, left_val) {
            (BinaryOperator::And, false) => Ok(Value::Boolean(false)),
            (BinaryOperator::Or, true) => Ok(Value::Boolean(true)),
            _ => match self.eval_expression(right, scope)? {
                Value::Boolean(b) => Ok(Value::Boolean(b)),
                other => Err(EvalError::TypeMismatch(format!(
                    "{:?} is not a boolean",
                    other
                ))),
            },
        }
    }

    fn eval_add(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l + r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l + *r as f64)),
            (Value::String(l), Value::String(r)) => Ok(Value::String(l.clone() + r)),
            _ => Err(EvalError::TypeMismatch(format!("{:?} + {:?}", left, right))),
        }
    }

    fn eval_subtract(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l - r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l - r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 - r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l - *r as f64)),
            _ => Err(EvalError::TypeMismatch(format!("{:?} - {:?}", left, right))),
        }
    }

    fn eval_multiply(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l * r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l * r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 * r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l * *r as f64)),
            _ => Err(EvalError::TypeMismatch(format!("{:?} * {:?}", left, right))),
        }
    }

    fn eval_divide(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Float(*l as f64 / *r as f64))
            }
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l / r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 / r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l / *r as f64)),
            _ => Err(EvalError::TypeMismatch(format!("{:?} / {:?}", left, right))),
        }
    }

    fn eval_in(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match right {
            Value::List(items) => Ok(Value::Boolean(items.contains(left))),
            // Membership in a map asks about its values: for `neighbors`
            // that is "does any neighbor show this state".
            Value::Map(map) => Ok(Value::Boolean(map.values().any(|v| v == left))),
            Value::String(haystack) => match left {
                Value::String(needle) => Ok(Value::Boolean(haystack.contains(needle.as_str()))),
                _ => Err(EvalError::TypeMismatch(format!(
                    "{:?} in {:?}",
                    left, right
                ))),
            },
            _ => Err(EvalError::TypeMismatch(format!(
                "{:?} in {:?}",
                left, right
            ))),
        }
    }

    fn compare_values<F>(&self, left: &Value, right: &Value, compare: F) -> EvalResult<Value>
    where
        F: Fn(std::cmp::Ordering) -> bool,
    {
        let ordering = match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
            (Value::Float(l), Value::Float(r)) => l.partial_cmp(r),
            (Value::Integer(l), Value::Float(r)) => (*l as f64).partial_cmp(r),
            (Value::Float(l), Value::Integer(r)) => l.partial_cmp(&(*r as f64)),
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            _ => None,
        };
        ordering.map(|o| Value::Boolean(compare(o))).ok_or_else(|| {
            EvalError::TypeMismatch(format!("{:?} <=> {:?}", left, right))
        })
    }
}
