//! Default Stampede runtime
//!
//! Serves the HTTP control endpoints, listens for `stop` on standard input and optionally starts a
//! run right away.
use crate::{error::RuntimeError, input::stdin_task, server::server_task, Control};
use clap::Parser;
use stampede_core::{RunConfig, DEFAULT_PORT};
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};

#[derive(Parser, Debug)]
#[command(version, about = "Scenario-driven load testing")]
struct StampedeCli {
    /// Port for the HTTP control endpoints.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Registered behavior to run on startup.
    #[arg(short, long)]
    behavior: Option<String>,

    /// Scenario text replacing the behavior's default profile.
    #[arg(short, long)]
    scenario: Option<String>,

    #[arg(long)]
    run_id: Option<String>,

    /// Do not read commands from standard input.
    #[arg(long)]
    no_stdin: bool,
}

/// Default Stampede runtime. (requires `rt` feature)
///
/// # Example
///
/// ```ignore
/// use stampede::prelude::*;
///
/// #[tokio::main]
/// async fn main() {
///     let mut registry = BehaviorRegistry::new();
///     registry.register("shopper", || Ok(Shopper::default())).unwrap();
///
///     StampedeRuntime::new(Controller::new(registry))
///         .with_args()
///         .run()
///         .await
///         .unwrap();
/// }
/// ```
pub struct StampedeRuntime {
    control: Arc<dyn Control>,
    port: u16,
    behavior: Option<String>,
    scenario: Option<String>,
    run_id: Option<String>,
    stdin: bool,
}

impl StampedeRuntime {
    pub fn new<C: Control>(control: C) -> Self {
        Self::with_control(Arc::new(control))
    }

    pub fn with_control(control: Arc<dyn Control>) -> Self {
        Self {
            control,
            port: DEFAULT_PORT,
            behavior: None,
            scenario: None,
            run_id: None,
            stdin: true,
        }
    }

    /// Use the default CLI arguments.
    ///
    /// `-p`, `--port` to set a custom port number (default `7621`)
    ///
    /// `-b`, `--behavior` and `-s`, `--scenario` to start a run right away
    ///
    /// # Example
    /// ```ignore
    /// $ ./my_load_test -p 2742
    /// $ ./my_load_test -b shopper -s "CreateLoopedUsers(amount:10);"
    /// ```
    pub fn with_args(self) -> Self {
        self.apply(StampedeCli::parse())
    }

    fn apply(mut self, args: StampedeCli) -> Self {
        self.port = args.port;
        self.behavior = args.behavior;
        self.scenario = args.scenario;
        self.run_id = args.run_id;
        self.stdin = !args.no_stdin;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn behavior(mut self, behavior: &str) -> Self {
        self.behavior = Some(behavior.to_string());
        self
    }

    pub fn scenario(mut self, scenario: &str) -> Self {
        self.scenario = Some(scenario.to_string());
        self
    }

    pub fn stdin(mut self, enabled: bool) -> Self {
        self.stdin = enabled;
        self
    }

    fn startup_run(&self) -> Option<RunConfig> {
        let Some(behavior) = &self.behavior else {
            if self.scenario.is_some() {
                warn!("Scenario text given without a behavior; ignoring it");
            }
            return None;
        };

        let mut config = RunConfig::new(behavior);
        config.scenario = self.scenario.clone();
        config.run_id = self.run_id.clone();
        Some(config)
    }

    /// Start the startup run (if any) and serve until the HTTP server stops.
    #[instrument(name = "stampede", skip_all, fields(port = self.port))]
    pub async fn run(self) -> Result<(), RuntimeError> {
        if let Some(config) = self.startup_run() {
            let run_id = self.control.run_scenario(config)?;
            info!("Started run {run_id}");
        }

        if self.stdin {
            let control = self.control.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = stdin_task(control).await {
                        error!("Standard input reader failed: {err}");
                    }
                }
                .in_current_span(),
            );
        }

        server_task(self.port, self.control).await
    }
}
