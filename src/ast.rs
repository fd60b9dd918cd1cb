use core::fmt;
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::parser::ParseError;

/// Immutable result of parsing one `monad <Name> { ... }` block.
///
/// A simulation may instantiate any number of independent agents from a
/// single definition; the definition itself is never mutated after parse.
#[derive(Debug, Clone, PartialEq)]
pub struct MonadDefinition {
    pub name: String,
    pub initial_state: Option<String>,
    pub initial_memory: IndexMap<String, Literal>,
    pub rules: Vec<Rule>,
    /// Raw rule-modifier scripts, deferred-parsed at application time.
    pub meta_rules: Vec<String>,
}

/// Classification of a rule by its trigger source.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Field,
    Tick,
}

/// A behavioral rule: a trigger expression paired with an action script.
///
/// The raw condition/action text is kept for exports and trace entries;
/// the compiled forms are produced once at load time. A compilation
/// failure is carried inside the rule so that a single bad rule is
/// reported and skipped at evaluation time instead of poisoning its
/// siblings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Rule {
    Field {
        condition: String,
        action: String,
        #[serde(skip)]
        compiled: CompiledRule,
    },
    Tick {
        trigger: String,
        action: String,
        #[serde(skip)]
        compiled: CompiledRule,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub condition: Result<Expression, ParseError>,
    pub action: Result<Vec<Statement>, ParseError>,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Field { .. } => RuleKind::Field,
            Rule::Tick { .. } => RuleKind::Tick,
        }
    }

    /// The trigger text: `condition` for field rules, `trigger` for tick
    /// rules. An empty trigger means "always".
    pub fn condition_text(&self) -> &str {
        match self {
            Rule::Field { condition, .. } => condition,
            Rule::Tick { trigger, .. } => trigger,
        }
    }

    pub fn action_text(&self) -> &str {
        match self {
            Rule::Field { action, .. } | Rule::Tick { action, .. } => action,
        }
    }

    pub fn compiled(&self) -> &CompiledRule {
        match self {
            Rule::Field { compiled, .. } | Rule::Tick { compiled, .. } => compiled,
        }
    }
}

/// Dotted access path, e.g. `neighbors.n` or `memory.age`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPath(pub Vec<String>);

impl Display for AccessPath {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl AccessPath {
    pub fn from_dot_path(path: &str) -> Self {
        Self(path.split('.').map(String::from).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Variable(String),
    MemberAccess(AccessPath),
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    And,
    Or,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// The fixed, non-extensible statement set of the action language.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `state => <expr>`, the only way an agent's state may change.
    StateAssign { value: Expression },
    /// `memory.<field> => <expr>`, creating the key if absent.
    MemoryAssign { key: String, value: Expression },
    /// Single-level guard; no `else`, no nesting.
    If {
        condition: Expression,
        then_block: Vec<Statement>,
    },
    /// `add_rule("<rule snippet>")`, only honored when a rule sink
    /// capability is present in the execution context.
    AddRule { source: String },
}
