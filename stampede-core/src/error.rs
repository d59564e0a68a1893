use std::sync::PoisonError;
use thiserror::Error;

/// Failure to turn scenario text into work units. No scenario is produced when this is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Unknown command \"{keyword}\" in '{statement}'")]
    UnknownCommand { keyword: String, statement: String },

    #[error("Command '{statement}' is missing required parameter \"{parameter}\"")]
    MissingParameter {
        statement: String,
        parameter: &'static str,
    },

    #[error("Command '{statement}' has an invalid value \"{value}\" for parameter \"{parameter}\"")]
    InvalidParameter {
        statement: String,
        parameter: String,
        value: String,
    },

    #[error("Command '{statement}' spreads zero users over time")]
    ZeroAmount { statement: String },

    #[error("Malformed statement '{statement}': {reason}")]
    Malformed {
        statement: String,
        reason: &'static str,
    },

    #[error("Comment block opened but never closed")]
    UnterminatedComment,

    #[error("Command \"{0}\" is already registered")]
    DuplicateCommand(String),
}

/// A behavior can not be registered, resolved or constructed.
#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error("No behavior registered under \"{0}\"")]
    NotRegistered(String),

    #[error("A behavior is already registered under \"{0}\"")]
    DuplicateBehavior(String),

    #[error("Behavior \"{0}\" declares no tasks")]
    NoTasks(String),

    #[error("Task \"{task}\" has invalid weight {weight}; weights must be at least 1")]
    InvalidWeight { task: String, weight: u32 },

    #[error("Failed to construct behavior \"{name}\": {source}")]
    Construction {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Faults on the control flow running a scenario. These abort the remaining work units.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("User pool mutex is poisoned.")]
    PoisonedPool,

    #[error("Can not spread zero users over {0:?}")]
    ZeroAmount(std::time::Duration),

    #[error("Scenario task panicked.")]
    Panicked,

    #[error("Scenario task was cancelled.")]
    Cancelled,
}

impl<T> From<PoisonError<T>> for ExecutionError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonedPool
    }
}

/// Errors from the externally callable run controls.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("A scenario is already running; stop it or wait for it to finish first.")]
    AlreadyRunning,

    #[error("No scenario is running.")]
    NoActiveRun,

    #[error("Controller mutex is poisoned.")]
    PoisonData,

    #[error("Scenario failed to compile: {0}")]
    Compile(#[from] CompileError),

    #[error("Behavior error: {0}")]
    Behavior(#[from] BehaviorError),

    #[error("Scenario execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

impl<T> From<PoisonError<T>> for ControlError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonData
    }
}
