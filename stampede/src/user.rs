//! Virtual users: one Tokio task per simulated actor.
use crate::behavior::{Session, Template, TaskResult};
use crate::context::{RunContext, CURRENT_RUN};
use crate::executor::pool::UserPool;
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
#[allow(unused_imports)]
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Lifecycle mode of a virtual user. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserMode {
    /// A single pass.
    Regular,
    /// Cycles until stopped.
    Looped,
    /// Cycles until stopped or a fixed number of cycles has run.
    Cycled,
}

impl fmt::Display for UserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserMode::Regular => "regular",
            UserMode::Looped => "looped",
            UserMode::Cycled => "cycled",
        };
        f.write_str(name)
    }
}

/// What a newly created user will do: its mode plus the cycle bound for [`UserMode::Cycled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Regular,
    Looped,
    Cycled { cycles: u32 },
}

impl Lifecycle {
    pub fn mode(&self) -> UserMode {
        match self {
            Lifecycle::Regular => UserMode::Regular,
            Lifecycle::Looped => UserMode::Looped,
            Lifecycle::Cycled { .. } => UserMode::Cycled,
        }
    }
}

/// Handle to a running virtual user, as held by the live pool.
#[derive(Debug)]
pub struct VirtualUser {
    id: u64,
    mode: UserMode,
    active: AtomicBool,
    abort: AbortHandle,
}

impl VirtualUser {
    pub(crate) fn new(id: u64, mode: UserMode, abort: AbortHandle) -> Self {
        Self {
            id,
            mode,
            active: AtomicBool::new(true),
            abort,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> UserMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Cooperative stop: looped and cycled users finish their current cycle and tear down.
    /// A regular user already inside its single pass is unaffected.
    pub fn request_stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Forced stop: cancels the user's task at its next suspension point. `tear_down` does not
    /// run for an aborted user.
    pub fn abort_execution(&self) {
        self.request_stop();
        self.abort.abort();
    }
}

/// Spawn a virtual user. The returned receiver resolves with the user's id once it has
/// registered itself in `pool`; it errors if the user never got that far.
pub(crate) fn launch(
    template: Arc<dyn Template>,
    lifecycle: Lifecycle,
    pool: Arc<UserPool>,
    context: RunContext,
) -> oneshot::Receiver<u64> {
    let (handle_tx, handle_rx) = oneshot::channel::<AbortHandle>();
    let (ready_tx, ready_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        let Ok(abort) = handle_rx.await else {
            return;
        };

        let user = Arc::new(VirtualUser::new(pool.next_id(), lifecycle.mode(), abort));
        // NOTE: Dropping the registration deregisters the user, including on abort or panic.
        let _registration = match pool.register(user.clone()) {
            Ok(registration) => registration,
            Err(err) => {
                error!("Unable to register virtual user: {err}");
                return;
            }
        };
        let _ = ready_tx.send(user.id());

        let span = info_span!("user", id = user.id(), mode = %user.mode());
        let worker = CURRENT_RUN.scope(
            context.clone(),
            lifecycle_of(template, lifecycle, user, context),
        );

        match AssertUnwindSafe(worker).catch_unwind().instrument(span.clone()).await {
            Ok(()) => {}
            Err(_) => span.in_scope(|| error!("Virtual user panicked")),
        }
    });

    let _ = handle_tx.send(join.abort_handle());
    ready_rx
}

async fn lifecycle_of(
    template: Arc<dyn Template>,
    lifecycle: Lifecycle,
    user: Arc<VirtualUser>,
    context: RunContext,
) {
    trace!("Virtual user started");

    let mut session = match template.instantiate() {
        Ok(session) => session,
        Err(err) => {
            error!("{err}");
            return;
        }
    };

    match run(session.as_mut(), lifecycle, &user, &context).await {
        Ok(()) => trace!("Virtual user finished"),
        Err(err) => error!("Virtual user failed: {err}"),
    }
}

async fn run(
    session: &mut dyn Session,
    lifecycle: Lifecycle,
    user: &VirtualUser,
    context: &RunContext,
) -> TaskResult {
    session.set_up().await?;

    let cycled = match lifecycle {
        Lifecycle::Regular => session.run_cycle().await,
        Lifecycle::Looped => cycle(session, user, context, None).await,
        Lifecycle::Cycled { cycles } => cycle(session, user, context, Some(cycles)).await,
    };

    let torn_down = session.tear_down().await;
    if let (Err(_), Err(err)) = (&cycled, &torn_down) {
        error!("Tear down after a failed cycle also failed: {err}");
    }

    cycled.and(torn_down)
}

async fn cycle(
    session: &mut dyn Session,
    user: &VirtualUser,
    context: &RunContext,
    limit: Option<u32>,
) -> TaskResult {
    let mut completed = 0u32;

    while user.is_active() && !context.should_stop() {
        if limit.is_some_and(|limit| completed >= limit) {
            break;
        }

        session.run_cycle().await?;
        completed += 1;

        // NOTE: A cycle whose every await is immediately ready would otherwise never hand the
        // worker thread back to the scheduler.
        tokio::task::yield_now().await;
    }

    debug!("Exiting after {completed} cycle(s)");
    Ok(())
}
