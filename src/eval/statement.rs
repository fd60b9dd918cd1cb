use thiserror::Error;

use super::context::ExecutionContext;
use super::expression::{ConditionError, EvalError, ExpressionEvaluator, Value};
use crate::ast::{Expression, Statement};
use crate::parser::ParseError;

/// Failure inside an action script or meta-script. Caught per rule /
/// per script by the engine; mutations applied before the failing
/// statement are retained (no rollback).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("if guard failed: {0}")]
    Guard(#[from] ConditionError),
    #[error("state must be a symbol or null, got {0:?}")]
    InvalidStateValue(Value),
    #[error("add_rule is not available in this context")]
    RuleSinkUnavailable,
}

/// Tree-walking interpreter for the fixed statement set. Statements
/// execute strictly in source order; there is no early return and no
/// looping construct.
pub struct StatementEvaluator {
    expression_evaluator: ExpressionEvaluator,
}

impl Default for StatementEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementEvaluator {
    pub fn new() -> Self {
        Self {
            expression_evaluator: ExpressionEvaluator::new(),
        }
    }

    pub fn execute_block(
        &self,
        statements: &[Statement],
        context: &mut ExecutionContext,
    ) -> Result<(), ActionError> {
        for statement in statements {
            self.execute_statement(statement, context)?;
        }
        Ok(())
    }

    pub fn execute_statement(
        &self,
        statement: &Statement,
        context: &mut ExecutionContext,
    ) -> Result<(), ActionError> {
        match statement {
            Statement::StateAssign { value } => self.execute_state_assign(value, context),
            Statement::MemoryAssign { key, value } => {
                self.execute_memory_assign(key, value, context)
            }
            Statement::If {
                condition,
                then_block,
            } => self.execute_if(condition, then_block, context),
            Statement::AddRule { source } => self.execute_add_rule(source, context),
        }
    }

    fn execute_state_assign(
        &self,
        value: &Expression,
        context: &mut ExecutionContext,
    ) -> Result<(), ActionError> {
        let value = self
            .expression_evaluator
            .eval_expression(value, &context.scope())?;
        *context.state = match value {
            Value::String(symbol) => Some(symbol),
            Value::Null => None,
            other => return Err(ActionError::InvalidStateValue(other)),
        };
        Ok(())
    }

    fn execute_memory_assign(
        &self,
        key: &str,
        value: &Expression,
        context: &mut ExecutionContext,
    ) -> Result<(), ActionError> {
        let value = self
            .expression_evaluator
            .eval_expression(value, &context.scope())?;
        context.memory.insert(key.to_string(), value);
        Ok(())
    }

    fn execute_if(
        &self,
        condition: &Expression,
        then_block: &[Statement],
        context: &mut ExecutionContext,
    ) -> Result<(), ActionError> {
        let held = self
            .expression_evaluator
            .evaluate_guard(condition, &context.scope())?;
        if held {
            for statement in then_block {
                self.execute_statement(statement, context)?;
            }
        }
        Ok(())
    }

    fn execute_add_rule(
        &self,
        source: &str,
        context: &mut ExecutionContext,
    ) -> Result<(), ActionError> {
        match &mut context.rules {
            Some(sink) => sink.add_rule(source),
            None => Err(ActionError::RuleSinkUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Rule;
    use crate::eval::context::{Memory, RuleSink, VariableContext};
    use crate::parser::{parse_action, parse_rule_snippet};

    fn run(
        script: &str,
        vars: &VariableContext,
        state: &mut Option<String>,
        memory: &mut Memory,
    ) -> Result<(), ActionError> {
        let statements = parse_action(script).unwrap();
        let mut context = ExecutionContext::new(vars, state, memory);
        StatementEvaluator::new().execute_block(&statements, &mut context)
    }

    #[test]
    fn test_state_assignment() {
        let vars = VariableContext::new();
        let mut state = Some("seed".to_string());
        let mut memory = Memory::new();

        run("state => 'grow'", &vars, &mut state, &mut memory).unwrap();
        assert_eq!(state, Some("grow".to_string()));

        run("state => null", &vars, &mut state, &mut memory).unwrap();
        assert_eq!(state, None);
    }

    #[test]
    fn test_state_must_be_symbol() {
        let vars = VariableContext::new();
        let mut state = None;
        let mut memory = Memory::new();

        let result = run("state => 42", &vars, &mut state, &mut memory);
        assert!(matches!(result, Err(ActionError::InvalidStateValue(_))));
        assert_eq!(state, None);
    }

    #[test]
    fn test_memory_assignment_creates_and_updates() {
        let vars = VariableContext::new();
        let mut state = None;
        let mut memory = Memory::new();

        run("memory.age => 1", &vars, &mut state, &mut memory).unwrap();
        assert_eq!(memory.get("age"), Some(&Value::Integer(1)));

        run(
            "memory.age => memory.age + 1",
            &vars,
            &mut state,
            &mut memory,
        )
        .unwrap();
        assert_eq!(memory.get("age"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_if_guard_sees_state_and_memory() {
        let vars = VariableContext::new();
        let mut state = Some("grow".to_string());
        let mut memory = Memory::new();
        memory.insert("age".to_string(), Value::Integer(5));

        run(
            "if (state == 'grow') { memory.tall => true }\nif (memory.age > 9) { memory.old => true }",
            &vars,
            &mut state,
            &mut memory,
        )
        .unwrap();
        assert_eq!(memory.get("tall"), Some(&Value::Boolean(true)));
        assert_eq!(memory.get("old"), None);
    }

    #[test]
    fn test_partial_mutations_survive_failure() {
        let vars = VariableContext::new();
        let mut state = Some("seed".to_string());
        let mut memory = Memory::new();

        let result = run(
            "state => 'grow'\nmemory.age => missing + 1\nstate => 'never'",
            &vars,
            &mut state,
            &mut memory,
        );
        assert!(result.is_err());
        // No rollback: the first statement's effect stands, the third
        // never ran.
        assert_eq!(state, Some("grow".to_string()));
        assert!(memory.is_empty());
    }

    #[test]
    fn test_add_rule_requires_capability() {
        let vars = VariableContext::new();
        let mut state = None;
        let mut memory = Memory::new();

        let result = run(
            r#"add_rule("on tick() { state => 'x' }")"#,
            &vars,
            &mut state,
            &mut memory,
        );
        assert!(matches!(result, Err(ActionError::RuleSinkUnavailable)));
    }

    #[derive(Default)]
    struct CollectingSink {
        rules: Vec<Rule>,
    }

    impl RuleSink for CollectingSink {
        fn add_rule(&mut self, source: &str) -> Result<(), ActionError> {
            self.rules.push(parse_rule_snippet(source)?);
            Ok(())
        }
    }

    #[test]
    fn test_add_rule_through_capability() {
        let vars = VariableContext::new();
        let mut state = None;
        let mut memory = Memory::new();
        let mut sink = CollectingSink::default();

        let statements =
            parse_action(r#"add_rule("on field(temperature > 80) { state => 'glow' }")"#).unwrap();
        let mut context =
            ExecutionContext::with_rule_sink(&vars, &mut state, &mut memory, &mut sink);
        StatementEvaluator::new()
            .execute_block(&statements, &mut context)
            .unwrap();

        assert_eq!(sink.rules.len(), 1);
        assert_eq!(sink.rules[0].condition_text(), "temperature > 80");
    }
}
