use reqwest::Client;
use stampede::prelude::*;
use std::time::Duration;
use tracing_subscriber::FmtSubscriber;

struct Shopper {
    client: Client,
    base: String,
}

impl Shopper {
    fn new() -> Result<Self, TaskError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(5)).build()?,
            base: "http://0.0.0.0:3002".to_string(),
        })
    }

    #[transaction]
    async fn browse(&mut self) -> Result<(), reqwest::Error> {
        self.client
            .get(format!("{}/products", self.base))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    #[transaction]
    async fn checkout(&mut self) -> Result<(), reqwest::Error> {
        self.client
            .post(format!("{}/checkout", self.base))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn browse_task(&mut self) -> TaskResult {
        Ok(self.browse().await?)
    }

    async fn checkout_task(&mut self) -> TaskResult {
        Ok(self.checkout().await?)
    }
}

#[async_trait]
impl Behavior for Shopper {
    fn tasks() -> TaskSet<Self> {
        TaskSet::new()
            .task(
                Task::new("browse", |s: &mut Shopper| Box::pin(s.browse_task()))
                    .weight(9)
                    .delay_after(Duration::from_millis(250)),
            )
            .task(Task::new("checkout", |s: &mut Shopper| Box::pin(s.checkout_task())))
    }
}

/// Serves the control endpoints on port 7621. Start a run with
///
/// ```text
/// curl -XPOST localhost:7621/run -H 'content-type: application/json' -d '{"behavior":"shopper"}'
/// ```
///
/// and type `stop` to end it.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("stampede=debug,tower_http=debug")
        .init();

    let mut registry = BehaviorRegistry::new();
    registry.register_with_profile(
        "shopper",
        "CreateLoopedUsersOverTime(amount:50,seconds:30);
         Delay(minutes:2);
         RemoveLoopedUsersOverTime(amount:50,seconds:30);
         WaitForAllClientsToFinish();",
        Shopper::new,
    )?;

    StampedeRuntime::new(Controller::new(registry))
        .with_args()
        .run()
        .await?;

    Ok(())
}
