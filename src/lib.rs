//! # Monadica: a reactive-agent rule language and grid simulator
//!
//! Monadica runs small declarative agents ("monads") on a 2-D grid. Each
//! agent carries a symbolic state, an ordered memory store, and a list of
//! behavioral rules triggered by local field conditions or discrete time
//! ticks; a rule-modifier script may install new rules into its own agent
//! at runtime.
//!
//! ## Processing pipeline
//!
//! ```text
//! Source Code → Definition Parser → AST → Evaluators → Monad runtime → Simulation
//! ```
//!
//! ### Stage 1: Definition parsing
//!
//! The [`parser`] module isolates the `monad <Name> { ... }` block by
//! explicit brace-depth counting, then extracts the state initializer,
//! memory literal, rules, and the trailing rule-modifier script. Rule
//! conditions and actions are parsed once, at load time, into the
//! [`ast`] node types.
//!
//! ### Stage 2: Evaluation
//!
//! The [`eval`] module holds the two tree-walking interpreters: a pure
//! condition-expression evaluator and an action-statement interpreter
//! that mutates agent state and memory through an explicit execution
//! context.
//!
//! ### Stage 3: The agent runtime
//!
//! The [`monad`] module owns one live agent: rule evaluation with
//! per-rule fault containment, meta-rule application with the injected
//! `add_rule` capability, the state-transition trace, and the adequacy
//! heuristic.
//!
//! ### Stage 4: Simulation
//!
//! The [`simulation`] module sweeps the grid in row-major order each
//! tick, building a per-cell context from the [`field`] readings and the
//! live neighbor states, and drives each agent's field, tick and meta
//! phases.

pub mod ast;
pub mod config;
pub mod error;
pub mod eval;
pub mod field;
pub mod monad;
pub mod parser;
pub mod simulation;

// Re-exports
pub use ast::*;
pub use error::*;
pub use eval::*;
pub use field::Field;
pub use monad::{DebugSnapshot, Monad, MutationEntry, TraceEntry, FAVORABLE_STATES};
pub use parser::{parse_definition, parse_rule_snippet, ParseError};
pub use simulation::{Simulation, SimulationError};
