use std::collections::HashMap;

use indexmap::IndexMap;

use super::expression::Value;
use super::statement::ActionError;

/// An agent's memory store: insertion-ordered, string-keyed, holding the
/// typed value union.
pub type Memory = IndexMap<String, Value>;

/// Read-only variable bindings for condition evaluation: the tick
/// counter, the per-coordinate field readings, and the `neighbors` map.
///
/// Evaluation never mutates a context; the simulation builds a fresh one
/// per cell per tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableContext {
    vars: HashMap<String, Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tick-phase context: exactly `{t: tick}` and nothing else.
    pub fn with_tick(tick: u64) -> Self {
        let mut vars = HashMap::new();
        vars.insert("t".to_string(), Value::Integer(tick as i64));
        Self { vars }
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// The `t` binding when present; `-1` marks contexts without one
    /// (field-phase contexts carry no tick).
    pub fn tick(&self) -> i64 {
        match self.vars.get("t") {
            Some(Value::Integer(t)) => *t,
            _ => -1,
        }
    }
}

impl From<HashMap<String, Value>> for VariableContext {
    fn from(vars: HashMap<String, Value>) -> Self {
        Self { vars }
    }
}

/// Capability to install a rule into the running agent. Injected into a
/// meta-script's execution context only; plain rule actions never see it.
pub trait RuleSink {
    fn add_rule(&mut self, source: &str) -> Result<(), ActionError>;
}

/// Mutable execution context for an action script: the read-only
/// variables plus exclusive access to the agent's state and memory, and
/// optionally the rule-installation capability.
pub struct ExecutionContext<'a> {
    pub vars: &'a VariableContext,
    pub state: &'a mut Option<String>,
    pub memory: &'a mut Memory,
    pub rules: Option<&'a mut dyn RuleSink>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        vars: &'a VariableContext,
        state: &'a mut Option<String>,
        memory: &'a mut Memory,
    ) -> Self {
        Self {
            vars,
            state,
            memory,
            rules: None,
        }
    }

    pub fn with_rule_sink(
        vars: &'a VariableContext,
        state: &'a mut Option<String>,
        memory: &'a mut Memory,
        rules: &'a mut dyn RuleSink,
    ) -> Self {
        Self {
            vars,
            state,
            memory,
            rules: Some(rules),
        }
    }

    /// Read view of this context for expression evaluation.
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            vars: self.vars,
            state: Some(&*self.state),
            memory: Some(&*self.memory),
        }
    }
}

/// What an expression may read. Conditions see only the variable
/// context; expressions inside actions additionally see the current
/// state/memory snapshot.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub vars: &'a VariableContext,
    pub state: Option<&'a Option<String>>,
    pub memory: Option<&'a Memory>,
}

impl<'a> Scope<'a> {
    pub fn read_only(vars: &'a VariableContext) -> Self {
        Self {
            vars,
            state: None,
            memory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_context() {
        let context = VariableContext::with_tick(3);
        assert_eq!(context.get("t"), Some(&Value::Integer(3)));
        assert_eq!(context.tick(), 3);
    }

    #[test]
    fn test_tick_sentinel_without_binding() {
        let context = VariableContext::new();
        assert_eq!(context.tick(), -1);
    }

    #[test]
    fn test_execution_context_scope() {
        let vars = VariableContext::new();
        let mut state = Some("seed".to_string());
        let mut memory = Memory::new();
        memory.insert("age".to_string(), Value::Integer(1));

        let context = ExecutionContext::new(&vars, &mut state, &mut memory);
        let scope = context.scope();
        assert_eq!(scope.state, Some(&Some("seed".to_string())));
        assert_eq!(
            scope.memory.and_then(|m| m.get("age")),
            Some(&Value::Integer(1))
        );
    }
}
