use crate::DEFAULT_WATCH_INTERVAL;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

/// Parameters for a single run.
///
/// `behavior` names a registered behavior. When `scenario` holds non-blank text it replaces the
/// behavior's default load profile for this run.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub behavior: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_watch_interval")]
    pub watch_interval: Duration,
}

impl RunConfig {
    pub fn new(behavior: &str) -> Self {
        Self {
            behavior: behavior.to_string(),
            run_id: None,
            scenario: None,
            watch_interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    pub fn run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn scenario(mut self, scenario: &str) -> Self {
        self.scenario = Some(scenario.to_string());
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Scenario text supplied for this run, ignoring blank overrides.
    pub fn scenario_override(&self) -> Option<&str> {
        self.scenario
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

fn default_watch_interval() -> Duration {
    DEFAULT_WATCH_INTERVAL
}
