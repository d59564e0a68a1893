use serde::Serialize;
use std::time::Duration;

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub users_created: usize,
    /// Stop requests issued by removal commands.
    pub users_removed: usize,
    pub peak_users: usize,
    /// Calls wrapped with `#[transaction]` which returned `Ok`.
    pub transactions_succeeded: u64,
    pub transactions_failed: u64,
    pub elapsed: Duration,
    /// The run ended because the stop signal was raised.
    pub stopped: bool,
}

/// Point-in-time view of the controller, served by the runtime's `/status` endpoint.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunStatus {
    pub active: bool,
    pub run_id: Option<String>,
    pub behavior: Option<String>,
    pub live_users: usize,
    pub stop_requested: bool,
}
