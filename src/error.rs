use thiserror::Error;

use crate::eval::expression::ConditionError;
use crate::eval::statement::ActionError;
use crate::parser::ParseError;
use crate::simulation::SimulationError;

#[derive(Error, Debug)]
pub enum Error {
    /// Parser could not locate or balance a monad block. Fatal to that
    /// parse: simulation setup aborts before any tick runs.
    #[error("malformed definition: {0}")]
    MalformedDefinition(#[from] ParseError),
    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),
    #[error("action error: {0}")]
    Action(#[from] ActionError),
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
