mod utils;
#[allow(unused)]
use utils::*;

use stampede::core::{BehaviorError, CompileError, ControlError};
use stampede::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[ntest::timeout(10_000)]
async fn default_profile_runs_to_completion() {
    init();
    let cycles = Arc::new(AtomicUsize::new(0));
    let controller = Controller::new(registry(&cycles));

    let run_id = controller.run_scenario("window-shopper", Some("profile")).unwrap();
    assert_eq!(run_id, "profile");

    let stats = controller.wait_for_scenario_to_finish().await.unwrap();
    assert_eq!(stats.users_created, 4);
    assert_eq!(cycles.load(Ordering::SeqCst), 12);
    assert_eq!(stats.transactions_succeeded, 8);
    assert_eq!(stats.transactions_failed, 4);
    assert!(!stats.stopped);

    let status = controller.status().unwrap();
    assert!(!status.active);
    assert_eq!(status.live_users, 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn scenario_text_overrides_the_profile() {
    init();
    let cycles = Arc::new(AtomicUsize::new(0));
    let controller = Controller::new(registry(&cycles));

    controller
        .start(RunConfig::new("window-shopper").scenario(
            "## two batches ##
             Repeat(times:2) {
                 CreateCycledUsers(amount:1,cyclesToRun:2);
             }
             WaitForAllClientsToFinish();",
        ))
        .unwrap();

    let stats = controller.wait_for_scenario_to_finish().await.unwrap();
    assert_eq!(stats.users_created, 2);
    assert_eq!(cycles.load(Ordering::SeqCst), 4);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn rejects_bad_runs_before_any_user_starts() {
    init();
    let cycles = Arc::new(AtomicUsize::new(0));
    let controller = Controller::new(registry(&cycles));

    assert!(matches!(
        controller.run_scenario("ghost", None),
        Err(ControlError::Behavior(BehaviorError::NotRegistered(name))) if name == "ghost"
    ));
    assert!(matches!(
        controller.start(RunConfig::new("shopper").scenario("CreateUsers(amount:1)")),
        Err(ControlError::Compile(CompileError::Malformed { .. }))
    ));
    assert!(matches!(
        controller.wait_for_scenario_to_finish().await,
        Err(ControlError::NoActiveRun)
    ));
    assert_eq!(cycles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn stop_execution_ends_a_looped_run() {
    init();
    let cycles = Arc::new(AtomicUsize::new(0));
    let controller = Controller::new(registry(&cycles));

    controller
        .start(
            RunConfig::new("shopper")
                .run_id("looped")
                .scenario("CreateLoopedUsers(amount:5);WaitForAllClientsToFinish();"),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        controller.run_scenario("shopper", None),
        Err(ControlError::AlreadyRunning)
    ));

    let status = controller.status().unwrap();
    assert!(status.active);
    assert_eq!(status.run_id.as_deref(), Some("looped"));
    assert_eq!(status.live_users, 5);

    controller.stop_execution().unwrap();
    controller.stop_execution().unwrap();

    let stats = controller.wait_for_scenario_to_finish().await.unwrap();
    assert!(stats.stopped);
    assert_eq!(stats.users_created, 5);
    assert!(cycles.load(Ordering::SeqCst) >= 5);

    // The finished run no longer blocks a new one.
    controller.run_scenario("window-shopper", None).unwrap();
    controller.wait_for_scenario_to_finish().await.unwrap();
}
