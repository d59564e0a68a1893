mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use reqwest::{Client, StatusCode};
    use serde_json::{json, Value};
    use stampede::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const BASE: &str = "http://127.0.0.1:7631";

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(20_000)]
    async fn http_run_status_and_stop() {
        init();
        let cycles = Arc::new(AtomicUsize::new(0));

        tokio::spawn(
            StampedeRuntime::new(Controller::new(registry(&cycles)))
                .port(7631)
                .stdin(false)
                .run(),
        );
        tokio::time::sleep(Duration::from_millis(200)).await;

        let client = Client::new();

        let res = client
            .post(format!("{BASE}/run"))
            .json(&json!({
                "behavior": "shopper",
                "run_id": "http",
                "scenario": "CreateLoopedUsersOverTime(amount:3,seconds:1);WaitForAllClientsToFinish();",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let started: Value = res.json().await.unwrap();
        assert_eq!(started["run_id"], "http");

        let res = client
            .post(format!("{BASE}/run"))
            .json(&json!({ "behavior": "shopper" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = client
            .post(format!("{BASE}/run"))
            .json(&json!({ "behavior": "ghost" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let status: Value = client
            .get(format!("{BASE}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["active"], true);
        assert_eq!(status["live_users"], 3);

        let res = client.post(format!("{BASE}/stop")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let mut active = true;
        for _ in 0..50 {
            let status: Value = client
                .get(format!("{BASE}/status"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            active = status["active"] == true;
            if !active {
                assert_eq!(status["stop_requested"], true);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!active);
        assert!(cycles.load(Ordering::SeqCst) > 0);

        let res = client
            .post(format!("{BASE}/run"))
            .json(&json!({ "behavior": "ghost" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
