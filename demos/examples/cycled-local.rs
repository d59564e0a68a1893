use stampede::prelude::*;
use std::time::Duration;
use tracing_subscriber::FmtSubscriber;

#[derive(Default)]
struct Reader {
    pages: u32,
}

impl Reader {
    #[transaction]
    async fn read_page(&mut self) -> Result<u32, std::io::Error> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.pages += 1;
        Ok(self.pages)
    }

    async fn read_task(&mut self) -> TaskResult {
        self.read_page().await?;
        Ok(())
    }

    async fn log_in(&mut self) -> TaskResult {
        tracing::debug!("Reader logged in");
        Ok(())
    }
}

#[async_trait]
impl Behavior for Reader {
    fn tasks() -> TaskSet<Self> {
        TaskSet::new()
            .task(Task::new("read", |r: &mut Reader| Box::pin(r.read_task())))
            .before_each(|r: &mut Reader| Box::pin(r.log_in()))
    }

    async fn tear_down(&mut self) -> TaskResult {
        tracing::info!("Reader finished after {} pages", self.pages);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("stampede=info")
        .init();

    let mut registry = BehaviorRegistry::new();
    registry.register("reader", || Ok(Reader::default()))?;

    let controller = Controller::new(registry);
    controller.start(RunConfig::new("reader").scenario(
        "## three waves of readers ##
         Repeat(times:3) {
             CreateCycledUsersOverTime(amount:10,cyclesToRun:20,seconds:5);
             Delay(seconds:2);
         }
         WaitForAllClientsToFinish();",
    ))?;

    let stats = controller.wait_for_scenario_to_finish().await?;
    tracing::info!(
        "{} users, {} transactions ({} failed) in {:.2}s",
        stats.users_created,
        stats.transactions_succeeded + stats.transactions_failed,
        stats.transactions_failed,
        stats.elapsed.as_secs_f64()
    );

    Ok(())
}
