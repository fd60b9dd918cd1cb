//! Tree-walking evaluators for the two embedded languages: condition
//! expressions and action statements. Conditions are pure reads over a
//! variable context; actions mutate an agent's state and memory through
//! an explicit execution context.

pub mod context;
pub mod expression;
pub mod statement;

pub use context::{ExecutionContext, Memory, RuleSink, Scope, VariableContext};
pub use expression::{ConditionError, EvalError, EvalResult, ExpressionEvaluator, Value};
pub use statement::{ActionError, StatementEvaluator};
