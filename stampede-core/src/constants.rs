use std::time::Duration;

/// How often a scenario executor polls the stop signal.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(1);

/// Default port for the HTTP control surface.
pub const DEFAULT_PORT: u16 = 7621;

/// Marker opening and closing a comment block in scenario text.
pub const COMMENT_MARKER: &str = "##";

/// Profile used for a registered behavior which does not provide one of its own.
pub const DEFAULT_PROFILE: &str = "CreateUsers(amount:1);WaitForAllClientsToFinish();";

/// Upper bound on the work units a single scenario may expand to.
pub const MAX_WORK_UNITS: usize = 1_000_000;
