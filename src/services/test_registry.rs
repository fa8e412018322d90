//! Authoritative mapping from test id to its active runner.
//!
//! The registry is the single point of mutual exclusion for the whole
//! supervisor: every mutating or snapshot-reading operation, including the
//! reconciliation loop's scan, serializes through one lock around the
//! internal map. The lock is deliberately held across the runner's `start`
//! and `kill` awaits so that operations are strictly ordered relative to the
//! registry; a slow start or kill delays other registry operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::error::SupervisorError;
use crate::domain::models::{Allocation, TestOutcome, ZombieRecord};
use crate::domain::ports::{Clock, Sleeper, TestRunner};

/// How long [`TestRegistry::kill_test_by_device_id`] waits for the killed
/// test to close. Unrelated to the test's own timeout budget.
const WAIT_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll interval while waiting for a device-triggered kill to close.
const WAIT_CLOSE_INTERVAL: Duration = Duration::from_secs(3);

/// Result of one reconciliation sweep over the registry.
#[derive(Debug, Default)]
pub(crate) struct SweepReport {
    /// Test ids removed from the registry this tick.
    pub removed: Vec<String>,
    /// Executions whose kill-attempt count reached the escalation ceiling.
    pub zombies: Vec<ZombieRecord>,
}

/// Registry of active test executions, keyed by test id.
///
/// At most one live entry exists per test id at any time. Entries are created
/// only by [`TestRegistry::start`] and destroyed either by
/// [`TestRegistry::kill_and_remove`] (for already-stopped runners) or by the
/// reconciliation sweep once a runner is simultaneously not running and
/// closed.
pub struct TestRegistry<R: TestRunner> {
    runners: Mutex<HashMap<String, Arc<R>>>,
}

impl<R: TestRunner> Default for TestRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: TestRunner> TestRegistry<R> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { runners: Mutex::new(HashMap::new()) }
    }

    /// Register `runner` under its execution unit's test id, then start it.
    ///
    /// Fails with [`SupervisorError::AlreadyRunning`] if an entry already
    /// exists for that id; the runner is never started twice for the same id.
    /// If the runner fails to start, the entry is removed again and the
    /// failure surfaces as [`SupervisorError::Start`].
    pub async fn start(&self, runner: Arc<R>) -> Result<(), SupervisorError> {
        let mut runners = self.runners.lock().await;
        let test_id = runner.execution_unit().test_id().to_string();
        if runners.contains_key(&test_id) {
            return Err(SupervisorError::AlreadyRunning(test_id));
        }
        runners.insert(test_id.clone(), Arc::clone(&runner));
        info!(test_id, test_name = runner.execution_unit().name(), "starting test");
        if let Err(source) = runner.start().await {
            runners.remove(&test_id);
            return Err(SupervisorError::Start { test_id, source });
        }
        Ok(())
    }

    /// Kill the test if it is running, or remove its entry if it has already
    /// stopped. A running test keeps its entry; the reconciliation loop
    /// prunes it once the runner reports stopped and closed. Unknown ids are
    /// a logged no-op.
    pub async fn kill_and_remove(&self, test_id: &str) {
        let mut runners = self.runners.lock().await;
        match runners.get(test_id) {
            Some(runner) if runner.is_running() => {
                let attempts = runner.kill(false).await;
                info!(test_id, attempts, "kill requested; entry left for the next sweep to prune");
            }
            Some(_) => {
                runners.remove(test_id);
                info!(test_id, "test already stopped; removed from registry");
            }
            None => {
                warn!(test_id, "asked to kill a test that is not registered");
            }
        }
    }

    /// Kill whichever registered test currently holds the given device and
    /// wait for it to close.
    ///
    /// No registered test holding the device, or a runner that already
    /// reports closed, is an immediate no-op. Otherwise the runner is killed
    /// with escalation once per poll interval until it reports closed,
    /// bounded by [`WAIT_CLOSE_TIMEOUT`]; repeated kills cover runners that
    /// ignore the first signal. Returns whether the runner is closed when the
    /// wait ends.
    pub async fn kill_test_by_device_id(
        &self,
        device_id: &str,
        clock: &dyn Clock,
        sleeper: &dyn Sleeper,
    ) -> bool {
        let runner = {
            let runners = self.runners.lock().await;
            runners
                .values()
                .find(|runner| runner.allocation().device_ids().contains(device_id))
                .cloned()
        };
        let Some(runner) = runner else {
            info!(device_id, "no registered test holds this device");
            return true;
        };
        let test_id = runner.execution_unit().test_id();
        if runner.is_closed() {
            info!(test_id, device_id, "test already closed, no need to kill");
            return true;
        }
        info!(test_id, device_id, "killing test holding device and waiting for it to close");

        let deadline = chrono::Duration::from_std(WAIT_CLOSE_TIMEOUT)
            .ok()
            .and_then(|wait| clock.now().checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        while clock.now() < deadline {
            sleeper.sleep(WAIT_CLOSE_INTERVAL).await;
            if runner.is_closed() {
                break;
            }
            runner.kill(true).await;
        }

        if runner.is_closed() {
            info!(test_id, device_id, "test closed after device-triggered kill");
        } else {
            warn!(
                test_id,
                device_id,
                wait = ?WAIT_CLOSE_TIMEOUT,
                "test did not close within the wait window"
            );
        }
        runner.is_closed()
    }

    /// Whether any registered runner currently reports running.
    pub async fn is_any_running(&self) -> bool {
        let runners = self.runners.lock().await;
        runners.values().any(|runner| runner.is_running())
    }

    /// Ids of all registered tests whose runner currently reports running.
    pub async fn running_test_ids(&self) -> Vec<String> {
        let runners = self.runners.lock().await;
        runners
            .iter()
            .filter(|(_, runner)| runner.is_running())
            .map(|(test_id, _)| test_id.clone())
            .collect()
    }

    /// Ids of all registered tests owned by the given job, regardless of
    /// running state.
    pub async fn test_ids_for_job(&self, job_id: &str) -> Vec<String> {
        let runners = self.runners.lock().await;
        runners
            .iter()
            .filter(|(_, runner)| runner.execution_unit().job().id() == job_id)
            .map(|(test_id, _)| test_id.clone())
            .collect()
    }

    /// Whether the test named by the allocation has a live entry.
    ///
    /// When it does, the caller's device-id set must agree with the one bound
    /// to the registered runner; a mismatch fails with
    /// [`SupervisorError::DuplicatedAllocation`].
    pub async fn is_running(&self, allocation: &Allocation) -> Result<bool, SupervisorError> {
        let runners = self.runners.lock().await;
        let Some(runner) = runners.get(allocation.test_id()) else {
            return Ok(false);
        };
        let registered = runner.allocation().device_ids();
        if registered != allocation.device_ids() {
            return Err(SupervisorError::DuplicatedAllocation {
                test_id: allocation.test_id().to_string(),
                registered: registered.clone(),
                presented: allocation.device_ids().clone(),
            });
        }
        Ok(true)
    }

    /// Runner for the given test id, for collaborating internal helpers only.
    pub(crate) async fn get_or_not_found(&self, test_id: &str) -> Result<Arc<R>, SupervisorError> {
        let runners = self.runners.lock().await;
        runners
            .get(test_id)
            .cloned()
            .ok_or_else(|| SupervisorError::TestNotFound(test_id.to_string()))
    }

    /// One reconciliation sweep under a single lock acquisition.
    ///
    /// For every entry: an expired timer triggers an escalating kill (the
    /// runner returns its consecutive attempt count); a stopped-and-closed
    /// runner is marked for removal; an expired, still-running execution at
    /// or above `escalation_ceiling` produces a [`ZombieRecord`]. Marked
    /// entries are removed after the scan, never while iterating.
    pub(crate) async fn sweep(&self, clock: &dyn Clock, escalation_ceiling: u32) -> SweepReport {
        let mut runners = self.runners.lock().await;
        let mut removable = Vec::new();
        let mut zombies = Vec::new();

        for (test_id, runner) in runners.iter() {
            let expired = runner.execution_unit().timer().is_expired(clock);
            let mut attempts = 0;
            if expired {
                if !runner.is_running() && runner.outcome() == TestOutcome::Unknown {
                    error!(
                        test_id,
                        "expired test finished with an unknown outcome; \
                         proceeding with forced termination"
                    );
                }
                attempts = runner.kill(true).await;
                debug!(test_id, attempts, "requested kill of expired test");
            }
            if !runner.is_running() && runner.is_closed() {
                removable.push(test_id.clone());
            } else if expired && runner.is_running() && attempts >= escalation_ceiling {
                warn!(
                    test_id,
                    attempts, escalation_ceiling, "test resisted cooperative termination"
                );
                zombies.push(ZombieRecord::new(
                    runner.execution_unit().clone(),
                    runner.allocation().clone(),
                    attempts,
                ));
            }
        }

        for test_id in &removable {
            runners.remove(test_id);
            info!(test_id, "removed finished test from registry");
        }

        SweepReport { removed: removable, zombies }
    }
}
