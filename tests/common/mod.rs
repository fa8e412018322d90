//! Shared fakes for supervisor integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use labsup::domain::error::{InventoryError, StartError};
use labsup::domain::models::{Allocation, ExecutionUnit, JobUnit, TestOutcome};
use labsup::domain::ports::{Clock, Pid, ProcessInventory, Sleeper, TestRunner};

/// Fixed start-of-test instant.
pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z").unwrap().to_utc()
}

/// Manually advanced clock shared by timers, throttles, and assertions.
pub struct StepClock {
    now: Mutex<DateTime<Utc>>,
}

impl StepClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Sleeper that blocks until the test grants a tick, making the
/// reconciliation loop single-steppable.
pub struct ManualSleeper {
    permits: tokio::sync::Semaphore,
}

impl ManualSleeper {
    pub fn new() -> Self {
        Self { permits: tokio::sync::Semaphore::new(0) }
    }

    /// Allow the loop to run exactly one more tick.
    pub fn tick(&self) {
        self.permits.add_permits(1);
    }
}

#[async_trait]
impl Sleeper for ManualSleeper {
    async fn sleep(&self, _duration: Duration) {
        let permit = self.permits.acquire().await.expect("sleeper semaphore closed");
        permit.forget();
    }
}

/// Poll `condition` until it holds or a 5 second budget runs out.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

/// Runner whose observable state is fully scripted by the test.
pub struct ScriptedRunner {
    execution: ExecutionUnit,
    allocation: Allocation,
    running: AtomicBool,
    closed: AtomicBool,
    kill_attempts: AtomicU32,
    escalated_kills: AtomicU32,
    outcome: Mutex<TestOutcome>,
}

impl ScriptedRunner {
    /// Runner under `job_id` whose test timer starts at [`epoch`] with the
    /// given budget.
    pub fn create(
        test_id: &str,
        job_id: &str,
        devices: &[&str],
        test_timeout: Duration,
    ) -> Self {
        let job = Arc::new(JobUnit::new(
            job_id.to_string(),
            format!("{job_id}-name"),
            "ScriptedDriver".to_string(),
            epoch(),
            Duration::from_secs(3600),
            test_timeout,
        ));
        let execution =
            ExecutionUnit::new(test_id.to_string(), format!("{test_id}-name"), job, epoch());
        let allocation =
            Allocation::new(test_id.to_string(), devices.iter().map(ToString::to_string));
        Self {
            execution,
            allocation,
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            kill_attempts: AtomicU32::new(0),
            escalated_kills: AtomicU32::new(0),
            outcome: Mutex::new(TestOutcome::Unknown),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    pub fn set_outcome(&self, outcome: TestOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn attempts(&self) -> u32 {
        self.kill_attempts.load(Ordering::SeqCst)
    }

    pub fn escalated_kills(&self) -> u32 {
        self.escalated_kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestRunner for ScriptedRunner {
    async fn start(&self) -> Result<(), StartError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn kill(&self, escalate: bool) -> u32 {
        if escalate {
            self.escalated_kills.fetch_add(1, Ordering::SeqCst);
        }
        self.kill_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn execution_unit(&self) -> &ExecutionUnit {
        &self.execution
    }

    fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    fn outcome(&self) -> TestOutcome {
        *self.outcome.lock().unwrap()
    }
}

/// Inventory with no processes that records how often it is queried, so
/// tests can count reclamation passes.
pub struct RecordingInventory {
    test_queries: AtomicU32,
    device_queries: AtomicU32,
    terminations: AtomicU32,
}

impl RecordingInventory {
    pub fn new() -> Self {
        Self {
            test_queries: AtomicU32::new(0),
            device_queries: AtomicU32::new(0),
            terminations: AtomicU32::new(0),
        }
    }

    pub fn test_queries(&self) -> u32 {
        self.test_queries.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> u32 {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessInventory for RecordingInventory {
    async fn pids_for_test(
        &self,
        _job_id: &str,
        _test_id: &str,
    ) -> Result<Vec<Pid>, InventoryError> {
        self.test_queries.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }

    async fn pids_for_device(&self, _device_id: &str) -> Result<Vec<Pid>, InventoryError> {
        self.device_queries.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }

    async fn terminate(&self, _pid: Pid) -> Result<(), InventoryError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn describe(&self, pid: Pid) -> Result<String, InventoryError> {
        Ok(format!("pid {pid}"))
    }
}
