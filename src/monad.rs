use serde::Serialize;
use tracing::{debug, warn};

use crate::ast::{MonadDefinition, Rule, RuleKind};
use crate::eval::{
    ActionError, ExecutionContext, ExpressionEvaluator, Memory, RuleSink, StatementEvaluator,
    Value, VariableContext,
};
use crate::parser::{parse_action, parse_rule_snippet};

/// States rewarded by the adequacy heuristic. A convention, not a
/// structural property: the engine enforces no terminal states.
pub const FAVORABLE_STATES: [&str; 2] = ["goal", "glow"];

/// One recorded state transition. Appended only when a triggered rule's
/// action actually changed `state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// The `t` binding of the triggering context; `-1` for contexts
    /// without one (field-phase evaluation).
    pub tick: i64,
    pub rule_type: RuleKind,
    pub condition: String,
    pub prev_state: Option<String>,
    pub new_state: Option<String>,
}

/// One rule installation performed by a meta-script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationEntry {
    pub tick: i64,
    #[serde(rename = "type")]
    pub rule_type: RuleKind,
    pub source: String,
    pub rule: String,
}

/// Serializable view of an agent for the debug-persistence collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub name: String,
    pub state: Option<String>,
    pub memory: Memory,
    pub rules: Vec<Rule>,
    pub meta_rules: Vec<String>,
    pub trace_log: Vec<TraceEntry>,
    pub rule_mutations: Vec<MutationEntry>,
    pub adequacy: f64,
}

/// A live grid-cell agent: symbolic state, memory store, and a mutable
/// rule list that meta-rules may grow at runtime.
///
/// `state` changes only inside a successful action execution; `memory`
/// only inside a successful action or meta-script execution. Rules added
/// by meta-scripts become eligible on the next tick, because the meta
/// phase runs after this cell's rule evaluation phases.
#[derive(Debug, Clone)]
pub struct Monad {
    name: String,
    state: Option<String>,
    memory: Memory,
    rules: Vec<Rule>,
    meta_rules: Vec<String>,
    trace_log: Vec<TraceEntry>,
    rule_mutations: Vec<MutationEntry>,
    last_triggered: Vec<(RuleKind, String)>,
}

impl Monad {
    /// Instantiates an agent from a definition. Memory and rules are
    /// independent copies; many agents may share one definition.
    pub fn new(definition: &MonadDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            state: definition.initial_state.clone(),
            memory: definition
                .initial_memory
                .iter()
                .map(|(key, literal)| (key.clone(), Value::from(literal)))
                .collect(),
            rules: definition.rules.clone(),
            meta_rules: definition.meta_rules.clone(),
            trace_log: Vec::new(),
            rule_mutations: Vec::new(),
            last_triggered: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn meta_rules(&self) -> &[String] {
        &self.meta_rules
    }

    pub fn trace_log(&self) -> &[TraceEntry] {
        &self.trace_log
    }

    pub fn rule_mutations(&self) -> &[MutationEntry] {
        &self.rule_mutations
    }

    pub fn last_triggered(&self) -> &[(RuleKind, String)] {
        &self.last_triggered
    }

    /// Evaluates every rule of the given kind, in list order, against the
    /// context. A failure in one rule's condition or action is reported
    /// and that rule skipped; siblings and later rule kinds still run.
    pub fn evaluate_rules(&mut self, kind: RuleKind, context: &VariableContext) {
        let expressions = ExpressionEvaluator::new();
        let statements = StatementEvaluator::new();

        for index in 0..self.rules.len() {
            let rule = self.rules[index].clone();
            if rule.kind() != kind {
                continue;
            }
            let condition_text = rule.condition_text().to_string();

            let held = match &rule.compiled().condition {
                Ok(expression) => match expressions.evaluate_condition(expression, context) {
                    Ok(held) => held,
                    Err(e) => {
                        warn!(
                            "monad `{}`: rule {} ({}) condition failed: {}",
                            self.name, index, kind, e
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        "monad `{}`: rule {} ({}) has an unparsable condition: {}",
                        self.name, index, kind, e
                    );
                    continue;
                }
            };
            if !held {
                continue;
            }

            let action = match &rule.compiled().action {
                Ok(action) => action,
                Err(e) => {
                    warn!(
                        "monad `{}`: rule {} ({}) has an unparsable action: {}",
                        self.name, index, kind, e
                    );
                    continue;
                }
            };

            let prev_state = self.state.clone();
            let result = {
                let mut execution =
                    ExecutionContext::new(context, &mut self.state, &mut self.memory);
                statements.execute_block(action, &mut execution)
            };

            match result {
                Ok(()) => {
                    if self.state != prev_state {
                        self.trace_log.push(TraceEntry {
                            tick: context.tick(),
                            rule_type: kind,
                            condition: condition_text.clone(),
                            prev_state,
                            new_state: self.state.clone(),
                        });
                    }
                    self.last_triggered.push((kind, condition_text));
                }
                Err(e) => {
                    // Partial mutations stand; the trigger is not recorded.
                    warn!(
                        "monad `{}`: rule {} ({}) action failed: {}",
                        self.name, index, kind, e
                    );
                }
            }
        }
    }

    pub fn evaluate_field(&mut self, context: &VariableContext) {
        self.evaluate_rules(RuleKind::Field, context);
    }

    pub fn evaluate_tick(&mut self, tick: u64) {
        let context = VariableContext::with_tick(tick);
        self.evaluate_rules(RuleKind::Tick, &context);
    }

    /// Runs each meta-rule script once, in list order. Scripts are
    /// deferred-parsed; a script that fails to parse or execute is
    /// reported and skipped without blocking later scripts. Rules
    /// installed before a mid-script failure are retained.
    pub fn apply_meta_rules(&mut self) {
        let statements = StatementEvaluator::new();
        let vars = VariableContext::new();

        for index in 0..self.meta_rules.len() {
            let script = self.meta_rules[index].clone();
            let parsed = match parse_action(&script) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(
                        "monad `{}`: meta-rule {} failed to parse: {}",
                        self.name, index, e
                    );
                    continue;
                }
            };

            let mut collector = RuleCollector::default();
            let result = {
                let mut execution = ExecutionContext::with_rule_sink(
                    &vars,
                    &mut self.state,
                    &mut self.memory,
                    &mut collector,
                );
                statements.execute_block(&parsed, &mut execution)
            };
            if let Err(e) = result {
                warn!("monad `{}`: meta-rule {} failed: {}", self.name, index, e);
            }

            for (rule, source) in collector.installed {
                debug!("monad `{}`: installed rule `{}`", self.name, source);
                self.rule_mutations.push(MutationEntry {
                    tick: -1,
                    rule_type: rule.kind(),
                    source: "meta".to_string(),
                    rule: source,
                });
                self.rules.push(rule);
            }
        }
    }

    /// Heuristic fitness in [0, 1]: a favorable-state bonus minus
    /// penalties for trace growth and rule-set growth (a proxy for
    /// runaway self-modification). Rounded to 3 decimals.
    pub fn adequacy_score(&self) -> f64 {
        let mut score = 0.0;
        if self
            .state
            .as_deref()
            .is_some_and(|s| FAVORABLE_STATES.contains(&s))
        {
            score += 0.4;
        }
        score += (0.3 - 0.01 * self.trace_log.len() as f64).max(0.0);
        score += (0.3 - 0.01 * self.rules.len() as f64).max(0.0);
        (score.min(1.0) * 1000.0).round() / 1000.0
    }

    pub fn export_debug_snapshot(&self) -> DebugSnapshot {
        DebugSnapshot {
            name: self.name.clone(),
            state: self.state.clone(),
            memory: self.memory.clone(),
            rules: self.rules.clone(),
            meta_rules: self.meta_rules.clone(),
            trace_log: self.trace_log.clone(),
            rule_mutations: self.rule_mutations.clone(),
            adequacy: self.adequacy_score(),
        }
    }

    pub fn export_trace_log(&self) -> &[TraceEntry] {
        &self.trace_log
    }
}

/// Collects rules a meta-script installs through its `add_rule`
/// capability; the monad appends them (and the audit entries) once the
/// script finishes.
#[derive(Default)]
struct RuleCollector {
    installed: Vec<(Rule, String)>,
}

impl RuleSink for RuleCollector {
    fn add_rule(&mut self, source: &str) -> Result<(), ActionError> {
        let rule = parse_rule_snippet(source)?;
        self.installed.push((rule, source.to_string()));
        Ok(())
    }
}
