//! Compiled scenarios and the work units they are made of.
use crate::behavior::Template;
use crate::context::RunContext;
use crate::executor::ScenarioExecutor;
use crate::translator::Translator;
use crate::user::{Lifecycle, UserMode};
use stampede_core::{CompileError, ExecutionError, RunStatistics};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// One deferred action against a [`ScenarioExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkUnit {
    /// Create users, all at once or spread over a duration.
    Create {
        amount: usize,
        lifecycle: Lifecycle,
        over: Option<Duration>,
    },
    /// Stop the oldest live users of a mode, all at once or spread over a duration.
    Remove {
        amount: usize,
        mode: UserMode,
        over: Option<Duration>,
    },
    Delay(Duration),
    /// Block until no user is live. Never times out, so looped users must be stopped first.
    WaitForAllClientsToFinish,
}

impl WorkUnit {
    pub async fn apply(&self, executor: &ScenarioExecutor) -> Result<(), ExecutionError> {
        match *self {
            WorkUnit::Create {
                amount,
                lifecycle,
                over: None,
            } => executor.create_at_once(amount, lifecycle).await,
            WorkUnit::Create {
                amount,
                lifecycle,
                over: Some(over),
            } => executor.create_over_time(amount, lifecycle, over).await,
            WorkUnit::Remove {
                amount,
                mode,
                over: None,
            } => executor.remove_at_once(amount, mode).await,
            WorkUnit::Remove {
                amount,
                mode,
                over: Some(over),
            } => executor.remove_over_time(amount, mode, over).await,
            WorkUnit::Delay(duration) => {
                executor.delay(duration).await;
                Ok(())
            }
            WorkUnit::WaitForAllClientsToFinish => {
                executor.wait_for_all_to_finish().await;
                Ok(())
            }
        }
    }
}

/// Ordered work units bound to the executor they run against.
///
/// # Example
/// ```no_run
/// use stampede::prelude::*;
///
/// # #[derive(Default)]
/// # struct Browser;
/// # impl Browser { async fn visit(&mut self) -> TaskResult { Ok(()) } }
/// # #[async_trait]
/// # impl Behavior for Browser {
/// #     fn tasks() -> TaskSet<Self> {
/// #         TaskSet::new().task(Task::new("visit", |b: &mut Browser| Box::pin(b.visit())))
/// #     }
/// # }
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let template = BehaviorTemplate::<Browser>::from_default("browser")?.shared();
///     let scenario = Scenario::compile(
///         "CreateLoopedUsersOverTime(amount:10,seconds:10);
///          Delay(minutes:1);
///          RemoveLoopedUsers(amount:10);
///          WaitForAllClientsToFinish();",
///         template,
///         RunContext::new("local"),
///     )?;
///
///     let stats = scenario.execute().await?;
///     tracing::info!("{stats:?}");
///     Ok(())
/// }
/// ```
pub struct Scenario {
    units: Vec<WorkUnit>,
    executor: Arc<ScenarioExecutor>,
}

impl Scenario {
    /// Compile `text` with the built-in commands. No executor is created if compilation fails.
    ///
    /// NOTE: Must be called from within a Tokio runtime.
    pub fn compile(
        text: &str,
        template: Arc<dyn Template>,
        context: RunContext,
    ) -> Result<Self, CompileError> {
        Self::compile_with(&Translator::new(), text, template, context)
    }

    pub fn compile_with(
        translator: &Translator,
        text: &str,
        template: Arc<dyn Template>,
        context: RunContext,
    ) -> Result<Self, CompileError> {
        let units = translator.compile(text)?;
        let executor = Arc::new(ScenarioExecutor::new(template, context));
        Ok(Self::from_units(units, executor))
    }

    pub fn from_units(units: Vec<WorkUnit>, executor: Arc<ScenarioExecutor>) -> Self {
        Self { units, executor }
    }

    pub fn work_units(&self) -> &[WorkUnit] {
        &self.units
    }

    pub fn executor(&self) -> &Arc<ScenarioExecutor> {
        &self.executor
    }

    /// Run every work unit in order. Returns once the last one returns; live users are only
    /// waited for if the scenario asks for it.
    #[instrument(name = "scenario", skip_all, fields(
        run_id = self.executor.context().run_id(),
        behavior = self.executor.behavior(),
    ))]
    pub async fn execute(&self) -> Result<RunStatistics, ExecutionError> {
        info!("Running {} work unit(s)", self.units.len());
        let start = Instant::now();

        for (index, unit) in self.units.iter().enumerate() {
            if self.executor.context().should_stop() {
                info!(
                    "Stop signal raised, skipping the remaining {} work unit(s)",
                    self.units.len() - index
                );
                break;
            }

            trace!("Applying {unit:?}");
            unit.apply(&self.executor).await?;
        }

        let stats = self.executor.statistics(start.elapsed());
        info!(
            "Scenario complete in {} ({} created, {} removed, peak {})",
            humantime::format_duration(stats.elapsed),
            stats.users_created,
            stats.users_removed,
            stats.peak_users
        );
        Ok(stats)
    }
}
