//! Population control for one behavior.
//!
//! The [`ScenarioExecutor`] owns the live pool of virtual users and performs every population
//! change a scenario asks for. All operations check the run's stop signal before acting, and timed
//! ("over time") operations check it before every step, returning early without error once it is
//! raised.
use crate::behavior::Template;
use crate::context::RunContext;
use crate::user::{self, Lifecycle, UserMode};
use futures_util::future::join_all;
use stampede_core::{ExecutionError, RunStatistics};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub(crate) mod pool;

use pool::UserPool;

pub struct ScenarioExecutor {
    template: Arc<dyn Template>,
    pool: Arc<UserPool>,
    context: RunContext,
    watcher: JoinHandle<()>,
    created: AtomicUsize,
    removed: AtomicUsize,
}

impl ScenarioExecutor {
    /// Create an executor and start its stop-signal watcher.
    ///
    /// NOTE: Must be called from within a Tokio runtime.
    pub fn new(template: Arc<dyn Template>, context: RunContext) -> Self {
        let pool = Arc::new(UserPool::new(template.name()));
        let watcher = watch_stop_signal(pool.clone(), context.clone());

        Self {
            template,
            pool,
            context,
            watcher,
            created: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn behavior(&self) -> &str {
        self.template.name()
    }

    pub fn live_users(&self) -> usize {
        self.pool.len()
    }

    /// Launch `amount` users and return once each of them is registered in the pool.
    pub async fn create_at_once(
        &self,
        amount: usize,
        lifecycle: Lifecycle,
    ) -> Result<(), ExecutionError> {
        if self.context.should_stop() {
            trace!("Stop signal raised, not creating {amount} users");
            return Ok(());
        }

        let launched = (0..amount).map(|_| {
            user::launch(
                self.template.clone(),
                lifecycle,
                self.pool.clone(),
                self.context.clone(),
            )
        });
        let started = join_all(launched)
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count();

        self.created.fetch_add(started, Ordering::Relaxed);
        debug!("Created {started} {} user(s)", lifecycle.mode());
        Ok(())
    }

    /// Create `amount` users one at a time, pausing `over / amount` after each.
    pub async fn create_over_time(
        &self,
        amount: usize,
        lifecycle: Lifecycle,
        over: Duration,
    ) -> Result<(), ExecutionError> {
        let step = step_delay(amount, over)?;
        debug!(
            "Creating {amount} {} user(s), one every {}",
            lifecycle.mode(),
            humantime::format_duration(step)
        );

        for _ in 0..amount {
            if self.context.should_stop() {
                debug!("Stop signal raised, abandoning creation over time");
                break;
            }
            self.create_at_once(1, lifecycle).await?;
            if !self.pause(step).await {
                break;
            }
        }

        Ok(())
    }

    /// Ask up to `amount` of the oldest live users in `mode` to stop, dropping them from the pool
    /// right away. Fewer live users than requested is not an error.
    pub async fn remove_at_once(&self, amount: usize, mode: UserMode) -> Result<(), ExecutionError> {
        if self.context.should_stop() {
            trace!("Stop signal raised, not removing {amount} users");
            return Ok(());
        }

        let users = self.pool.take(amount, mode)?;
        if users.len() < amount {
            info!(
                "Requested removal of {amount} {mode} user(s) but only {} are live",
                users.len()
            );
        }

        for user in &users {
            user.request_stop();
        }

        self.removed.fetch_add(users.len(), Ordering::Relaxed);
        debug!("Removed {} {mode} user(s)", users.len());
        Ok(())
    }

    /// Remove `amount` users one at a time, pausing `over / amount` after each.
    pub async fn remove_over_time(
        &self,
        amount: usize,
        mode: UserMode,
        over: Duration,
    ) -> Result<(), ExecutionError> {
        let step = step_delay(amount, over)?;
        debug!(
            "Removing {amount} {mode} user(s), one every {}",
            humantime::format_duration(step)
        );

        for _ in 0..amount {
            if self.context.should_stop() {
                debug!("Stop signal raised, abandoning removal over time");
                break;
            }
            self.remove_at_once(1, mode).await?;
            if !self.pause(step).await {
                break;
            }
        }

        Ok(())
    }

    /// Wait until every live user, of any mode, has finished.
    ///
    /// This never times out. Looped users only finish once removed or once the stop signal is
    /// raised, so a scenario must stop them before waiting.
    pub async fn wait_for_all_to_finish(&self) {
        debug!("Waiting for {} user(s) to finish", self.pool.len());
        self.pool.wait_until_empty().await;
    }

    /// Force-interrupt every user still running, including removed users that have not exited
    /// yet and users that register afterwards.
    pub fn abort_execution(&self) -> Result<(), ExecutionError> {
        let aborted = self.pool.abort_all()?;
        debug!("Aborted {aborted} user(s)");
        Ok(())
    }

    /// Block the scenario for `duration`, or until the stop signal is raised.
    pub async fn delay(&self, duration: Duration) {
        trace!("Delaying for {}", humantime::format_duration(duration));
        self.pause(duration).await;
    }

    pub fn statistics(&self, elapsed: Duration) -> RunStatistics {
        let (transactions_succeeded, transactions_failed) = self.context.transaction_counts();
        RunStatistics {
            users_created: self.created.load(Ordering::Relaxed),
            users_removed: self.removed.load(Ordering::Relaxed),
            peak_users: self.pool.peak(),
            transactions_succeeded,
            transactions_failed,
            elapsed,
            stopped: self.context.should_stop(),
        }
    }

    /// Returns `false` if the pause was cut short by the stop signal.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.context.stop_signal().raised() => {
                trace!("Pause interrupted by stop signal");
                false
            }
        }
    }
}

// Users hold the pool, not the executor, so nothing could stop them once it is gone.
impl Drop for ScenarioExecutor {
    fn drop(&mut self) {
        self.watcher.abort();

        let remaining = self.pool.len() + self.pool.draining();
        if remaining > 0 {
            debug!("Executor dropped, aborting {remaining} remaining user(s)");
            if let Err(err) = self.pool.abort_all() {
                error!("Unable to abort users: {err}");
            }
        }
    }
}

fn step_delay(amount: usize, over: Duration) -> Result<Duration, ExecutionError> {
    if amount == 0 {
        return Err(ExecutionError::ZeroAmount(over));
    }
    let millis = over.as_millis() / amount as u128;
    Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX)))
}

fn watch_stop_signal(pool: Arc<UserPool>, context: RunContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = context.watch_interval().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if context.should_stop() {
                break;
            }
        }

        match pool.abort_all() {
            Ok(aborted) => debug!("Stop signal observed, aborted {aborted} user(s)"),
            Err(err) => error!("Unable to abort users: {err}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Behavior, BehaviorTemplate, Task, TaskResult, TaskSet};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use tokio::time::Instant;

    struct Pacer;

    impl Pacer {
        async fn tick(&mut self) -> TaskResult {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }

    #[async_trait]
    impl Behavior for Pacer {
        fn tasks() -> TaskSet<Self> {
            TaskSet::new().task(Task::new("tick", |p: &mut Pacer| Box::pin(p.tick())))
        }
    }

    fn executor(run_id: &str) -> ScenarioExecutor {
        let template = BehaviorTemplate::new("pacer", || Ok(Pacer))
            .unwrap()
            .shared();
        ScenarioExecutor::new(template, RunContext::new(run_id))
    }

    #[tokio::test(start_paused = true)]
    async fn create_at_once_registers_every_user() {
        let executor = executor("create");
        executor
            .create_at_once(10, Lifecycle::Looped)
            .await
            .unwrap();

        assert_eq!(executor.live_users(), 10);
        executor.context().stop_signal().raise();
        executor.wait_for_all_to_finish().await;
        assert_eq!(executor.statistics(Duration::ZERO).users_created, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn create_over_time_spreads_steps_evenly() {
        let executor = executor("ramp");
        let start = Instant::now();

        executor
            .create_over_time(5, Lifecycle::Looped, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(executor.live_users(), 5);
        assert_eq!(executor.statistics(start.elapsed()).users_created, 5);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));

        executor.context().stop_signal().raise();
        executor.wait_for_all_to_finish().await;
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn remove_over_time_paces_and_clamps() {
        let executor = executor("drain");
        executor.create_at_once(3, Lifecycle::Looped).await.unwrap();
        let start = Instant::now();

        executor
            .remove_over_time(5, UserMode::Looped, Duration::from_secs(10))
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
        assert_eq!(executor.live_users(), 0);
        assert_eq!(executor.statistics(start.elapsed()).users_removed, 3);
        assert!(!executor.context().should_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_cuts_drain_short_without_error() {
        let executor = Arc::new(executor("drain-interrupted"));
        executor.create_at_once(4, Lifecycle::Looped).await.unwrap();

        let drain = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .remove_over_time(4, UserMode::Looped, Duration::from_secs(8))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        executor.context().stop_signal().raise();

        drain.await.unwrap().unwrap();
        assert_eq!(executor.statistics(Duration::ZERO).users_removed, 2);

        executor.wait_for_all_to_finish().await;
        assert_eq!(executor.live_users(), 0);
    }

    #[test]
    fn step_delay_divides_in_milliseconds() {
        assert_eq!(
            step_delay(5, Duration::from_secs(10)).unwrap(),
            Duration::from_millis(2_000)
        );
        assert_eq!(
            step_delay(3, Duration::from_millis(1_000)).unwrap(),
            Duration::from_millis(333)
        );
        assert!(matches!(
            step_delay(0, Duration::from_secs(1)),
            Err(ExecutionError::ZeroAmount(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn removal_is_clamped_to_live_users() {
        let executor = executor("remove");
        executor.create_at_once(3, Lifecycle::Looped).await.unwrap();
        executor
            .create_at_once(2, Lifecycle::Cycled { cycles: 1_000 })
            .await
            .unwrap();

        executor.remove_at_once(8, UserMode::Looped).await.unwrap();
        assert_eq!(executor.live_users(), 2);
        assert_eq!(executor.statistics(Duration::ZERO).users_removed, 3);

        executor.remove_at_once(1, UserMode::Regular).await.unwrap();
        assert_eq!(executor.live_users(), 2);

        executor.remove_at_once(2, UserMode::Cycled).await.unwrap();
        executor.wait_for_all_to_finish().await;
        assert_eq!(executor.statistics(Duration::ZERO).users_removed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_cuts_ramp_short_without_error() {
        let executor = Arc::new(executor("interrupted"));
        let ramp = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .create_over_time(10, Lifecycle::Looped, Duration::from_secs(10))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        executor.context().stop_signal().raise();

        ramp.await.unwrap().unwrap();
        let created = executor.statistics(Duration::ZERO).users_created;
        assert_eq!(created, 4);

        executor.wait_for_all_to_finish().await;
        assert_eq!(executor.live_users(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_returns_early_on_stop() {
        let executor = executor("delay");
        let stop = executor.context().stop_signal().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stop.raise();
        });

        let start = Instant::now();
        executor.delay(Duration::from_secs(60)).await;
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    struct Stubborn {
        cycles: Arc<AtomicU32>,
        completed: Arc<AtomicU32>,
    }

    impl Stubborn {
        async fn wait(&mut self) -> TaskResult {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn stubborn(cycles: &Arc<AtomicU32>, completed: &Arc<AtomicU32>) -> Arc<dyn Template> {
        let (cycles, completed) = (cycles.clone(), completed.clone());
        BehaviorTemplate::new("stubborn", move || {
            Ok(Stubborn {
                cycles: cycles.clone(),
                completed: completed.clone(),
            })
        })
        .unwrap()
        .shared()
    }

    #[async_trait]
    impl Behavior for Stubborn {
        fn tasks() -> TaskSet<Self> {
            TaskSet::new().task(Task::new("wait", |s: &mut Stubborn| Box::pin(s.wait())))
        }
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(2_000)]
    async fn watcher_aborts_parked_users() {
        let cycles = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU32::new(0));
        let executor =
            ScenarioExecutor::new(stubborn(&cycles, &completed), RunContext::new("watcher"));

        executor.create_at_once(4, Lifecycle::Regular).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 4);

        let start = Instant::now();
        executor.context().stop_signal().raise();
        executor.wait_for_all_to_finish().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(executor.statistics(start.elapsed()).stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_aborts_removed_users_still_in_a_task() {
        let cycles = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU32::new(0));
        let executor =
            ScenarioExecutor::new(stubborn(&cycles, &completed), RunContext::new("draining"));

        executor.create_at_once(2, Lifecycle::Looped).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        executor.remove_at_once(2, UserMode::Looped).await.unwrap();
        assert_eq!(executor.live_users(), 0);
        assert_eq!(executor.pool.draining(), 2);

        executor.context().stop_signal().raise();
        tokio::time::sleep(Duration::from_secs(5 * 3600)).await;

        assert_eq!(cycles.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(executor.pool.draining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_executor_aborts_its_users() {
        let cycles = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU32::new(0));
        let executor =
            ScenarioExecutor::new(stubborn(&cycles, &completed), RunContext::new("dropped"));

        executor.create_at_once(3, Lifecycle::Looped).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(executor);

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 3);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
