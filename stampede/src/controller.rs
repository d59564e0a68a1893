//! Run control: the behavior registry and the single active run.
use crate::behavior::{Behavior, BehaviorTemplate, TaskError, Template};
use crate::context::RunContext;
use crate::executor::ScenarioExecutor;
use crate::scenario::Scenario;
use crate::translator::Translator;
use stampede_core::{
    BehaviorError, ControlError, ExecutionError, RunConfig, RunStatistics, RunStatus,
    DEFAULT_PROFILE,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};
use uuid::Uuid;

struct Registered {
    template: Arc<dyn Template>,
    profile: Option<String>,
}

/// Behaviors a [`Controller`] can run, by name.
#[derive(Default)]
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Registered>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `B` under `name`. Runs without explicit scenario text use
    /// [`DEFAULT_PROFILE`](stampede_core::DEFAULT_PROFILE).
    pub fn register<B, F>(&mut self, name: &str, factory: F) -> Result<(), BehaviorError>
    where
        B: Behavior,
        F: Fn() -> Result<B, TaskError> + Send + Sync + 'static,
    {
        let template = BehaviorTemplate::new(name, factory)?.shared();
        self.insert(template, None)
    }

    /// Register `B` under `name` with its own default scenario text.
    pub fn register_with_profile<B, F>(
        &mut self,
        name: &str,
        profile: &str,
        factory: F,
    ) -> Result<(), BehaviorError>
    where
        B: Behavior,
        F: Fn() -> Result<B, TaskError> + Send + Sync + 'static,
    {
        let template = BehaviorTemplate::new(name, factory)?.shared();
        self.insert(template, Some(profile))
    }

    pub fn register_template(
        &mut self,
        template: Arc<dyn Template>,
        profile: Option<&str>,
    ) -> Result<(), BehaviorError> {
        self.insert(template, profile)
    }

    fn insert(&mut self, template: Arc<dyn Template>, profile: Option<&str>) -> Result<(), BehaviorError> {
        let name = template.name().to_string();
        if self.behaviors.contains_key(&name) {
            return Err(BehaviorError::DuplicateBehavior(name));
        }

        debug!("Registered behavior {name}");
        self.behaviors.insert(
            name,
            Registered {
                template,
                profile: profile.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Template and default profile for `name`.
    pub fn resolve(&self, name: &str) -> Result<(Arc<dyn Template>, &str), BehaviorError> {
        let registered = self
            .behaviors
            .get(name)
            .ok_or_else(|| BehaviorError::NotRegistered(name.to_string()))?;

        let profile = registered.profile.as_deref().unwrap_or(DEFAULT_PROFILE);
        Ok((registered.template.clone(), profile))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.behaviors.keys().map(String::as_str)
    }
}

struct ActiveRun {
    run_id: String,
    behavior: String,
    executor: Arc<ScenarioExecutor>,
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<RunStatistics, ExecutionError>>>,
}

impl ActiveRun {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Stop users a finished run left behind, e.g. looped users never removed by its scenario.
    fn retire(&self) {
        let leftover = self.executor.live_users();
        if leftover > 0 {
            info!("Stopping {leftover} user(s) left over from run {}", self.run_id);
        }
        self.executor.context().stop_signal().raise();
        if let Err(err) = self.executor.abort_execution() {
            error!("Unable to abort users of run {}: {err}", self.run_id);
        }
    }
}

// Flags the run as finished however its task ends.
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Starts and stops runs. At most one run is active at a time; a new run is rejected, not queued,
/// while the previous one is still executing.
pub struct Controller {
    registry: BehaviorRegistry,
    translator: Translator,
    active: Mutex<Option<ActiveRun>>,
}

impl Controller {
    pub fn new(registry: BehaviorRegistry) -> Self {
        Self {
            registry,
            translator: Translator::new(),
            active: Mutex::new(None),
        }
    }

    /// Use a translator with additional commands.
    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = translator;
        self
    }

    pub fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    /// Run the default profile of `behavior`. Returns the run id.
    pub fn run_scenario(&self, behavior: &str, run_id: Option<&str>) -> Result<String, ControlError> {
        let mut config = RunConfig::new(behavior);
        config.run_id = run_id.map(str::to_string);
        self.start(config)
    }

    /// Compile and spawn a run. Every compile and behavior error is returned before any user
    /// exists. Users still running from the previous, finished run are stopped first.
    ///
    /// NOTE: Must be called from within a Tokio runtime.
    #[instrument(name = "controller", skip_all, fields(behavior = %config.behavior))]
    pub fn start(&self, config: RunConfig) -> Result<String, ControlError> {
        let mut active = self.active.lock()?;
        if active.as_ref().is_some_and(|run| !run.is_finished()) {
            return Err(ControlError::AlreadyRunning);
        }

        let (template, profile) = self.registry.resolve(&config.behavior)?;
        let text = config.scenario_override().unwrap_or(profile);
        let units = self.translator.compile(text)?;

        let run_id = config
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let context = RunContext::new(&run_id).with_watch_interval(config.watch_interval);
        let executor = Arc::new(ScenarioExecutor::new(template, context));
        let scenario = Scenario::from_units(units, executor.clone());

        let finished = Arc::new(AtomicBool::new(false));
        let guard = FinishGuard(finished.clone());
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                scenario.execute().await
            }
            .in_current_span(),
        );

        if let Some(previous) = active.take() {
            previous.retire();
        }

        info!("Started run {run_id}");
        *active = Some(ActiveRun {
            run_id: run_id.clone(),
            behavior: config.behavior,
            executor,
            finished,
            handle: Some(handle),
        });

        Ok(run_id)
    }

    /// Raise the stop signal of the active run and force-abort its users. Further calls, or a call
    /// without an active run, have no effect.
    pub fn stop_execution(&self) -> Result<(), ControlError> {
        let active = self.active.lock()?;
        let Some(run) = active.as_ref() else {
            debug!("No run to stop");
            return Ok(());
        };

        if run.executor.context().stop_signal().raise() {
            warn!("Stopping run {}", run.run_id);
            if let Err(err) = run.executor.abort_execution() {
                error!("Unable to abort users of run {}: {err}", run.run_id);
            }
        }

        Ok(())
    }

    /// Wait for the active run's work units to complete and return its statistics. Only one
    /// caller receives them; later calls get [`ControlError::NoActiveRun`].
    pub async fn wait_for_scenario_to_finish(&self) -> Result<RunStatistics, ControlError> {
        let handle = {
            let mut active = self.active.lock()?;
            active
                .as_mut()
                .and_then(|run| run.handle.take())
                .ok_or(ControlError::NoActiveRun)?
        };

        match handle.await {
            Ok(res) => Ok(res?),
            Err(err) if err.is_panic() => Err(ExecutionError::Panicked.into()),
            Err(_) => Err(ExecutionError::Cancelled.into()),
        }
    }

    pub fn status(&self) -> Result<RunStatus, ControlError> {
        let active = self.active.lock()?;
        let status = match active.as_ref() {
            None => RunStatus::default(),
            Some(run) => RunStatus {
                active: !run.is_finished(),
                run_id: Some(run.run_id.clone()),
                behavior: Some(run.behavior.clone()),
                live_users: run.executor.live_users(),
                stop_requested: run.executor.context().should_stop(),
            },
        };
        Ok(status)
    }
}

#[cfg(feature = "rt")]
mod runtime {
    use super::*;
    use stampede_runtime::Control;

    impl Control for Controller {
        fn run_scenario(&self, config: RunConfig) -> Result<String, ControlError> {
            self.start(config)
        }

        fn stop_execution(&self) -> Result<(), ControlError> {
            Controller::stop_execution(self)
        }

        fn status(&self) -> Result<RunStatus, ControlError> {
            Controller::status(self)
        }
    }
}
