//! Per-run shared state: the run identity and the stop signal every executor and user observes.
use stampede_core::DEFAULT_WATCH_INTERVAL;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

tokio::task_local! {
    pub(crate) static CURRENT_RUN: RunContext;
}

/// Context of the run the calling virtual user belongs to.
///
/// Returns `None` outside of a virtual user. Long running tasks use this to poll
/// [`RunContext::should_stop`].
pub fn current_run() -> Option<RunContext> {
    CURRENT_RUN.try_with(|context| context.clone()).ok()
}

/// Run-wide stop flag.
///
/// Once raised it stays raised; a new run gets a new signal. Clones observe the same flag.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Returns `true` only for the call which actually raised it.
    pub fn raise(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has been raised.
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        // NOTE: The sender lives as long as `self`, so this can not observe a closed channel.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

#[derive(Debug, Default)]
pub(crate) struct TransactionCounts {
    success: AtomicU64,
    error: AtomicU64,
}

/// Explicit context for one run, handed to the executor and every virtual user it creates.
#[derive(Clone, Debug)]
pub struct RunContext {
    run_id: Arc<str>,
    stop: StopSignal,
    watch_interval: Duration,
    transactions: Arc<TransactionCounts>,
}

impl RunContext {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: Arc::from(run_id),
            stop: StopSignal::new(),
            watch_interval: DEFAULT_WATCH_INTERVAL,
            transactions: Arc::new(TransactionCounts::default()),
        }
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_raised()
    }

    pub fn watch_interval(&self) -> Duration {
        self.watch_interval
    }

    pub(crate) fn record_transaction(&self, success: bool) {
        let counter = if success {
            &self.transactions.success
        } else {
            &self.transactions.error
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// `(succeeded, failed)` transactions recorded so far.
    pub fn transaction_counts(&self) -> (u64, u64) {
        (
            self.transactions.success.load(Ordering::Relaxed),
            self.transactions.error.load(Ordering::Relaxed),
        )
    }
}
