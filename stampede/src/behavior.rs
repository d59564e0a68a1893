//! User-supplied behavior definitions.
//!
//! A [`Behavior`] describes what a single virtual user does: `set_up` once, then a number of
//! cycles which each run one task picked from its [`TaskSet`], then `tear_down` once. The task set
//! is declared once per type and shared by every user created from a [`BehaviorTemplate`].
//!
//! # Example
//! ```no_run
//! use stampede::prelude::*;
//!
//! struct Shopper {
//!     basket: usize,
//! }
//!
//! impl Shopper {
//!     async fn browse(&mut self) -> TaskResult {
//!         Ok(())
//!     }
//!
//!     async fn buy(&mut self) -> TaskResult {
//!         self.basket += 1;
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl Behavior for Shopper {
//!     fn tasks() -> TaskSet<Self> {
//!         TaskSet::new()
//!             .task(Task::new("browse", |s: &mut Shopper| Box::pin(s.browse())).weight(3))
//!             .task(Task::new("buy", |s: &mut Shopper| Box::pin(s.buy())))
//!     }
//! }
//! ```
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use stampede_core::BehaviorError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

pub type TaskError = Box<dyn std::error::Error + Send + Sync>;
pub type TaskResult = Result<(), TaskError>;

type TaskFn<B> = Arc<dyn for<'a> Fn(&'a mut B) -> BoxFuture<'a, TaskResult> + Send + Sync>;

/// Behavior executed by every virtual user of a scenario.
///
/// Each user gets its own instance; instances are never shared between users. Long running tasks
/// of one-shot (regular) users should watch the run's stop signal themselves.
#[async_trait]
pub trait Behavior: Send + Sized + 'static {
    /// Tasks and hooks for this type. Called once per registered template.
    fn tasks() -> TaskSet<Self>;

    async fn set_up(&mut self) -> TaskResult {
        Ok(())
    }

    async fn before_task(&mut self) -> TaskResult {
        Ok(())
    }

    async fn after_task(&mut self) -> TaskResult {
        Ok(())
    }

    async fn tear_down(&mut self) -> TaskResult {
        Ok(())
    }
}

/// A weighted unit of work within a [`TaskSet`].
pub struct Task<B> {
    name: String,
    weight: u32,
    delay_after: Duration,
    func: TaskFn<B>,
}

impl<B: Behavior> Task<B> {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut B) -> BoxFuture<'a, TaskResult> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            weight: 1,
            delay_after: Duration::ZERO,
            func: Arc::new(func),
        }
    }

    /// Relative selection weight. Defaults to 1.
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Fixed pause after the task and its hooks complete.
    pub fn delay_after(mut self, delay: Duration) -> Self {
        self.delay_after = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<B> fmt::Debug for Task<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("delay_after", &self.delay_after)
            .finish()
    }
}

struct Hook<B> {
    // None applies to every task
    scope: Option<String>,
    func: TaskFn<B>,
}

impl<B> Hook<B> {
    fn applies_to(&self, task: &str) -> bool {
        self.scope.as_deref().map_or(true, |scope| scope == task)
    }
}

/// Tasks of a behavior plus the hooks that run around them.
pub struct TaskSet<B> {
    tasks: Vec<Task<B>>,
    before: Vec<Hook<B>>,
    after: Vec<Hook<B>>,
    total_weight: u64,
}

impl<B: Behavior> TaskSet<B> {
    pub fn new() -> Self {
        Self {
            tasks: vec![],
            before: vec![],
            after: vec![],
            total_weight: 0,
        }
    }

    pub fn task(mut self, task: Task<B>) -> Self {
        self.total_weight += u64::from(task.weight);
        self.tasks.push(task);
        self
    }

    /// Hook run before every execution of the task named `task`.
    pub fn before<F>(mut self, task: &str, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut B) -> BoxFuture<'a, TaskResult> + Send + Sync + 'static,
    {
        self.before.push(Hook {
            scope: Some(task.to_string()),
            func: Arc::new(func),
        });
        self
    }

    /// Hook run before every task.
    pub fn before_each<F>(mut self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut B) -> BoxFuture<'a, TaskResult> + Send + Sync + 'static,
    {
        self.before.push(Hook {
            scope: None,
            func: Arc::new(func),
        });
        self
    }

    /// Hook run after every execution of the task named `task`.
    pub fn after<F>(mut self, task: &str, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut B) -> BoxFuture<'a, TaskResult> + Send + Sync + 'static,
    {
        self.after.push(Hook {
            scope: Some(task.to_string()),
            func: Arc::new(func),
        });
        self
    }

    /// Hook run after every task.
    pub fn after_each<F>(mut self, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut B) -> BoxFuture<'a, TaskResult> + Send + Sync + 'static,
    {
        self.after.push(Hook {
            scope: None,
            func: Arc::new(func),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn validate(&self, behavior: &str) -> Result<(), BehaviorError> {
        if self.tasks.is_empty() {
            return Err(BehaviorError::NoTasks(behavior.to_string()));
        }

        if let Some(task) = self.tasks.iter().find(|task| task.weight == 0) {
            return Err(BehaviorError::InvalidWeight {
                task: task.name.clone(),
                weight: task.weight,
            });
        }

        Ok(())
    }

    /// Pick the next task. A lone task is always picked; otherwise a uniform draw in
    /// `[0, total_weight)` has each weight subtracted in registration order until it reaches zero.
    ///
    /// NOTE: Must only be called on a validated (non-empty) set.
    fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &Task<B> {
        match self.tasks.as_slice() {
            [only] => only,
            tasks => {
                let mut remainder = rng.gen_range(0.0..self.total_weight as f64);
                let mut index = 0;
                while index < tasks.len() - 1 {
                    remainder -= f64::from(tasks[index].weight);
                    if remainder <= 0.0 {
                        break;
                    }
                    index += 1;
                }
                &tasks[index]
            }
        }
    }
}

impl<B: Behavior> Default for TaskSet<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Something a virtual user can be created from.
///
/// Implemented by [`BehaviorTemplate`]; the executor only deals with this erased form.
pub trait Template: Send + Sync {
    fn name(&self) -> &str;

    /// Build the per-user state for one new virtual user.
    fn instantiate(&self) -> Result<Box<dyn Session>, BehaviorError>;
}

/// The per-user half of a [`Template`]: one behavior instance and its task selection state.
#[async_trait]
pub trait Session: Send {
    async fn set_up(&mut self) -> TaskResult;

    /// One `before_task -> hooks -> task -> hooks -> after_task` pass.
    async fn run_cycle(&mut self) -> TaskResult;

    async fn tear_down(&mut self) -> TaskResult;
}

type Factory<B> = Box<dyn Fn() -> Result<B, TaskError> + Send + Sync>;

/// A named behavior type together with its constructor and its (validated) task set.
pub struct BehaviorTemplate<B> {
    name: String,
    tasks: Arc<TaskSet<B>>,
    factory: Factory<B>,
}

impl<B: Behavior> BehaviorTemplate<B> {
    pub fn new<F>(name: &str, factory: F) -> Result<Self, BehaviorError>
    where
        F: Fn() -> Result<B, TaskError> + Send + Sync + 'static,
    {
        let tasks = B::tasks();
        tasks.validate(name)?;
        debug!("Behavior {name} declares {} task(s)", tasks.len());

        Ok(Self {
            name: name.to_string(),
            tasks: Arc::new(tasks),
            factory: Box::new(factory),
        })
    }

    pub fn shared(self) -> Arc<dyn Template> {
        Arc::new(self)
    }
}

impl<B: Behavior + Default> BehaviorTemplate<B> {
    pub fn from_default(name: &str) -> Result<Self, BehaviorError> {
        Self::new(name, || Ok(B::default()))
    }
}

impl<B: Behavior> Template for BehaviorTemplate<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Result<Box<dyn Session>, BehaviorError> {
        let behavior = (self.factory)().map_err(|source| BehaviorError::Construction {
            name: self.name.clone(),
            source,
        })?;

        Ok(Box::new(BehaviorSession {
            behavior,
            tasks: self.tasks.clone(),
            rng: SmallRng::from_entropy(),
        }))
    }
}

struct BehaviorSession<B> {
    behavior: B,
    tasks: Arc<TaskSet<B>>,
    rng: SmallRng,
}

#[async_trait]
impl<B: Behavior> Session for BehaviorSession<B> {
    async fn set_up(&mut self) -> TaskResult {
        self.behavior.set_up().await
    }

    async fn run_cycle(&mut self) -> TaskResult {
        let tasks = self.tasks.clone();
        let task = tasks.select(&mut self.rng);
        trace!("Selected task {}", task.name);

        self.behavior.before_task().await?;

        for hook in tasks.before.iter().filter(|hook| hook.applies_to(&task.name)) {
            if let Err(err) = (hook.func)(&mut self.behavior).await {
                error!("Before-task hook for {} failed: {err}", task.name);
            }
        }

        (task.func)(&mut self.behavior).await?;

        for hook in tasks.after.iter().filter(|hook| hook.applies_to(&task.name)) {
            if let Err(err) = (hook.func)(&mut self.behavior).await {
                error!("After-task hook for {} failed: {err}", task.name);
            }
        }

        self.behavior.after_task().await?;

        if !task.delay_after.is_zero() {
            tokio::time::sleep(task.delay_after).await;
        }

        Ok(())
    }

    async fn tear_down(&mut self) -> TaskResult {
        self.behavior.tear_down().await
    }
}
