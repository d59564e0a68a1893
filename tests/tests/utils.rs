use stampede::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("stampede=debug,tower_http=debug")
            .init();
    });
}

/// Counts its own cycles and checkouts; every third checkout fails.
#[allow(unused)]
pub struct Shopper {
    pub cycles: Arc<AtomicUsize>,
    checkouts: usize,
}

#[allow(unused)]
impl Shopper {
    pub fn new(cycles: Arc<AtomicUsize>) -> Self {
        Self {
            cycles,
            checkouts: 0,
        }
    }

    #[transaction]
    async fn checkout(&mut self) -> Result<(), std::io::Error> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.checkouts += 1;
        if self.checkouts % 3 == 0 {
            return Err(std::io::Error::other("card declined"));
        }
        Ok(())
    }

    async fn cycle(&mut self) -> TaskResult {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        // Declined cards are part of the workload, not a task failure.
        let _ = self.checkout().await;
        Ok(())
    }
}

#[async_trait]
impl Behavior for Shopper {
    fn tasks() -> TaskSet<Self> {
        TaskSet::new().task(Task::new("checkout", |s: &mut Shopper| Box::pin(s.cycle())))
    }
}

#[allow(unused)]
pub fn registry(cycles: &Arc<AtomicUsize>) -> BehaviorRegistry {
    let mut registry = BehaviorRegistry::new();

    let shared = cycles.clone();
    registry
        .register("shopper", move || Ok(Shopper::new(shared.clone())))
        .unwrap();

    let shared = cycles.clone();
    registry
        .register_with_profile(
            "window-shopper",
            "CreateCycledUsers(amount:4,cyclesToRun:3);WaitForAllClientsToFinish();",
            move || Ok(Shopper::new(shared.clone())),
        )
        .unwrap();

    registry
}
