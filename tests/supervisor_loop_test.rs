//! End-to-end tests of the supervisor: registry, reconciliation loop, kill
//! escalation, zombie reclamation, and alert throttling, driven tick by tick
//! with a scripted runner, a manual sleeper, and a stepped clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use labsup::domain::models::{Allocation, SupervisorConfig, TestOutcome};
use labsup::domain::ports::{Clock, ProcessInventory, Sleeper};
use labsup::services::{AlertThrottle, ReconciliationLoop, TestRegistry, ZombieReaper};
use labsup::SupervisorError;

use common::{epoch, wait_until, ManualSleeper, RecordingInventory, ScriptedRunner, StepClock};

struct Harness {
    clock: Arc<StepClock>,
    sleeper: Arc<ManualSleeper>,
    inventory: Arc<RecordingInventory>,
    alerts: Arc<AlertThrottle>,
    registry: Arc<TestRegistry<ScriptedRunner>>,
    reconciliation: ReconciliationLoop<ScriptedRunner>,
    handle: tokio::task::JoinHandle<()>,
}

fn start_harness(config: SupervisorConfig) -> Harness {
    let clock = Arc::new(StepClock::new(epoch()));
    let sleeper = Arc::new(ManualSleeper::new());
    let inventory = Arc::new(RecordingInventory::new());
    let registry = Arc::new(TestRegistry::new());
    let reaper = Arc::new(ZombieReaper::new(
        Arc::clone(&inventory) as Arc<dyn ProcessInventory>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        config.snapshot_interval(),
    ));
    let alerts = Arc::new(AlertThrottle::new(
        Arc::clone(&clock) as Arc<dyn Clock>,
        config.alert_window(),
    ));
    let reconciliation = ReconciliationLoop::new(
        Arc::clone(&registry),
        reaper,
        Arc::clone(&alerts),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&sleeper) as Arc<dyn Sleeper>,
        config,
    );
    let handle = reconciliation.start();
    Harness { clock, sleeper, inventory, alerts, registry, reconciliation, handle }
}

/// Scenario: starting the same test id twice fails and leaves exactly one
/// entry.
#[tokio::test]
async fn duplicate_start_is_rejected() {
    let harness = start_harness(SupervisorConfig::default());
    let runner = Arc::new(ScriptedRunner::create("t1", "j1", &["d1"], Duration::from_secs(60)));
    harness.registry.start(Arc::clone(&runner)).await.unwrap();

    let again = Arc::new(ScriptedRunner::create("t1", "j1", &["d1"], Duration::from_secs(60)));
    let err = harness.registry.start(again).await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning(id) if id == "t1"));
    assert_eq!(harness.registry.running_test_ids().await, vec!["t1".to_string()]);
}

/// Scenario: an allocation whose device set disagrees with the registered
/// runner's is an invariant violation.
#[tokio::test]
async fn allocation_mismatch_is_surfaced() {
    let harness = start_harness(SupervisorConfig::default());
    let runner = Arc::new(ScriptedRunner::create("t1", "j1", &["d1"], Duration::from_secs(60)));
    harness.registry.start(runner).await.unwrap();

    let presented = Allocation::new("t1".to_string(), vec!["d2".to_string()]);
    assert!(matches!(
        harness.registry.is_running(&presented).await,
        Err(SupervisorError::DuplicatedAllocation { .. })
    ));
}

/// Scenario: an expired test is killed once per tick with a monotonically
/// increasing attempt count; reclamation fires exactly once, on the tick
/// where the count reaches the ceiling; once the runner reports stopped and
/// closed, the next tick removes the entry.
#[tokio::test]
async fn escalation_reaches_ceiling_then_reclamation_then_removal() {
    let config = SupervisorConfig::default(); // ceiling 30
    let harness = start_harness(config);
    let runner = Arc::new(ScriptedRunner::create("t1", "j1", &["d1"], Duration::from_secs(60)));
    harness.registry.start(Arc::clone(&runner)).await.unwrap();

    // Expire the test's timer.
    harness.clock.advance(chrono::Duration::seconds(120));

    // 29 ticks: escalating kills, attempts non-decreasing, no reclamation.
    for tick in 1..=29u32 {
        harness.sleeper.tick();
        wait_until(|| runner.attempts() == tick).await;
    }
    assert_eq!(runner.escalated_kills(), 29);
    assert_eq!(harness.inventory.test_queries(), 0);
    assert_eq!(harness.alerts.emitted_alerts(), 0);

    // Tick 30 reaches the ceiling: exactly one reclamation pass and one
    // aggregated alert.
    harness.sleeper.tick();
    wait_until(|| harness.alerts.emitted_alerts() == 1).await;
    assert_eq!(runner.attempts(), 30);
    assert_eq!(harness.inventory.test_queries(), 1);

    // Reclamation succeeded: the runner stops and closes, and the next tick
    // prunes the entry.
    runner.set_running(false);
    runner.set_closed(true);
    harness.sleeper.tick();
    for _ in 0..500 {
        if harness.registry.running_test_ids().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(harness.registry.running_test_ids().await.is_empty());
    let gone = Allocation::new("t1".to_string(), vec!["d1".to_string()]);
    assert!(!harness.registry.is_running(&gone).await.unwrap());

    harness.reconciliation.shutdown();
    harness.handle.await.unwrap();
}

/// Scenario: two tests of one job reach the ceiling in the same window and
/// produce exactly one aggregated alert; a later zombie tick inside the
/// window is suppressed.
#[tokio::test]
async fn zombie_alerts_are_aggregated_and_suppressed_within_window() {
    let config = SupervisorConfig { escalation_ceiling: 2, ..SupervisorConfig::default() };
    let harness = start_harness(config);

    let t1 = Arc::new(ScriptedRunner::create("t1", "j1", &["d1"], Duration::from_secs(60)));
    let t2 = Arc::new(ScriptedRunner::create("t2", "j1", &["d2"], Duration::from_secs(60)));
    harness.registry.start(Arc::clone(&t1)).await.unwrap();
    harness.registry.start(Arc::clone(&t2)).await.unwrap();
    harness.clock.advance(chrono::Duration::seconds(120));

    harness.sleeper.tick();
    wait_until(|| t1.attempts() == 1 && t2.attempts() == 1).await;
    assert_eq!(harness.alerts.emitted_alerts(), 0);

    // Both reach the ceiling on tick 2: one aggregated alert for the job.
    harness.sleeper.tick();
    wait_until(|| harness.alerts.emitted_alerts() == 1).await;

    // Still above the ceiling on tick 3, but inside the alert window.
    harness.sleeper.tick();
    wait_until(|| t1.attempts() == 3 && t2.attempts() == 3).await;
    assert_eq!(harness.alerts.emitted_alerts(), 1);

    harness.reconciliation.shutdown();
    harness.handle.await.unwrap();
}

/// A stopped-and-closed runner is pruned by the next tick even without any
/// timeout involvement.
#[tokio::test]
async fn finished_test_is_pruned_on_next_tick() {
    let harness = start_harness(SupervisorConfig::default());
    let runner = Arc::new(ScriptedRunner::create("t1", "j1", &["d1"], Duration::from_secs(60)));
    harness.registry.start(Arc::clone(&runner)).await.unwrap();

    runner.set_running(false);
    runner.set_closed(true);
    harness.sleeper.tick();
    for _ in 0..500 {
        if harness.registry.test_ids_for_job("j1").await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!harness.registry.is_any_running().await);
    assert!(harness.registry.test_ids_for_job("j1").await.is_empty());

    // No kill was ever requested.
    assert_eq!(runner.attempts(), 0);
}

/// Scenario: a test that stopped without a recognized outcome after its
/// timer expired is still force-killed, and its entry survives until the
/// runner closes.
#[tokio::test]
async fn expired_test_without_an_outcome_is_still_terminated() {
    let harness = start_harness(SupervisorConfig::default());
    let runner = Arc::new(ScriptedRunner::create("t1", "j1", &["d1"], Duration::from_secs(60)));
    harness.registry.start(Arc::clone(&runner)).await.unwrap();

    // Expired, stopped, not closed; the outcome stays Unknown.
    harness.clock.advance(chrono::Duration::seconds(120));
    runner.set_running(false);

    harness.sleeper.tick();
    wait_until(|| runner.attempts() == 1).await;
    assert_eq!(harness.registry.test_ids_for_job("j1").await, vec!["t1".to_string()]);

    // A late result lands and the runner closes; the next tick prunes it.
    runner.set_outcome(TestOutcome::Failed);
    runner.set_closed(true);
    harness.sleeper.tick();
    for _ in 0..500 {
        if harness.registry.test_ids_for_job("j1").await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(harness.registry.test_ids_for_job("j1").await.is_empty());
}

/// Shutdown during the sleep phase stops supervision permanently.
#[tokio::test]
async fn shutdown_terminates_the_loop() {
    let harness = start_harness(SupervisorConfig::default());
    harness.reconciliation.shutdown();
    tokio::time::timeout(Duration::from_secs(5), harness.handle)
        .await
        .expect("loop did not stop after shutdown")
        .expect("loop task panicked");
}

/// A shutdown signalled before the loop is started is buffered, not lost.
#[tokio::test]
async fn shutdown_before_start_is_not_lost() {
    let clock = Arc::new(StepClock::new(epoch()));
    let sleeper = Arc::new(ManualSleeper::new());
    let inventory = Arc::new(RecordingInventory::new());
    let config = SupervisorConfig::default();
    let registry: Arc<TestRegistry<ScriptedRunner>> = Arc::new(TestRegistry::new());
    let reaper = Arc::new(ZombieReaper::new(
        Arc::clone(&inventory) as Arc<dyn ProcessInventory>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        config.snapshot_interval(),
    ));
    let alerts = Arc::new(AlertThrottle::new(
        Arc::clone(&clock) as Arc<dyn Clock>,
        config.alert_window(),
    ));
    let reconciliation = ReconciliationLoop::new(
        registry,
        reaper,
        alerts,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&sleeper) as Arc<dyn Sleeper>,
        config,
    );

    reconciliation.shutdown();
    let handle = reconciliation.start();
    // No tick is ever granted; the buffered signal alone stops the loop.
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not observe the buffered shutdown")
        .expect("loop task panicked");
}
