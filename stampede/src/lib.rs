#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod behavior;
pub mod context;
pub mod controller;
pub mod executor;
pub mod scenario;
pub mod translator;
#[doc(hidden)]
pub mod transaction;
pub mod user;

pub use stampede_core as core;
pub use stampede_macros::transaction;

pub use behavior::{Behavior, BehaviorTemplate, Task, TaskError, TaskResult, TaskSet};
pub use context::{current_run, RunContext, StopSignal};
pub use controller::{BehaviorRegistry, Controller};
pub use executor::ScenarioExecutor;
pub use scenario::{Scenario, WorkUnit};
pub use translator::{CommandRegistry, Translator};
pub use user::{Lifecycle, UserMode};

#[cfg(feature = "rt")]
#[cfg_attr(docsrs, doc(cfg(feature = "rt")))]
pub use stampede_runtime::{self as runtime, Control, StampedeRuntime};

pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::behavior::{
        Behavior, BehaviorTemplate, Task, TaskError, TaskResult, TaskSet,
    };
    pub use crate::context::{current_run, RunContext};
    pub use crate::controller::{BehaviorRegistry, Controller};
    pub use crate::scenario::Scenario;
    pub use stampede_macros::transaction;

    #[cfg(feature = "rt")]
    pub use stampede_runtime::{Control, StampedeRuntime};

    pub use stampede_core::{RunConfig, RunStatistics};
}
