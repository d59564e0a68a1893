use stampede_core::{ControlError, RunConfig, RunStatus};

/// The two operations a remote or local operator may invoke on the engine, plus a status probe.
pub trait Control: Send + Sync + 'static {
    /// Start a run and return its id.
    fn run_scenario(&self, config: RunConfig) -> Result<String, ControlError>;

    /// Stop the active run. Must be idempotent.
    fn stop_execution(&self) -> Result<(), ControlError>;

    fn status(&self) -> Result<RunStatus, ControlError>;
}
