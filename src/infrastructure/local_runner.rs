//! Test runner variant driving a local OS process.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::error::StartError;
use crate::domain::models::{Allocation, ExecutionUnit, TestOutcome};
use crate::domain::ports::TestRunner;
use crate::infrastructure::process_inventory::{ENV_DEVICE_IDS, ENV_JOB_ID, ENV_TEST_ID};

/// Consecutive escalating kill attempts tolerated before switching from
/// SIGTERM to SIGKILL.
const FORCE_KILL_AFTER: u32 = 5;

#[derive(Debug)]
struct RunnerState {
    started: AtomicBool,
    running: AtomicBool,
    closed: AtomicBool,
    pid: AtomicU32,
    kill_attempts: AtomicU32,
    outcome: std::sync::Mutex<TestOutcome>,
}

/// Runs one test as a child process on this host.
///
/// The child is tagged with job/test/device environment markers so the
/// process inventory can find it (and anything it leaves behind) during
/// zombie reclamation. The runner owns the kill-attempt counter; escalating
/// kills fall back from SIGTERM to SIGKILL after repeated failures.
pub struct LocalProcessRunner {
    execution: ExecutionUnit,
    allocation: Allocation,
    command: Vec<String>,
    state: Arc<RunnerState>,
}

impl LocalProcessRunner {
    /// Create a runner for `execution` over `allocation`, executing
    /// `command` (program first).
    pub fn new(execution: ExecutionUnit, allocation: Allocation, command: Vec<String>) -> Self {
        Self {
            execution,
            allocation,
            command,
            state: Arc::new(RunnerState {
                started: AtomicBool::new(false),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                pid: AtomicU32::new(0),
                kill_attempts: AtomicU32::new(0),
                outcome: std::sync::Mutex::new(TestOutcome::Unknown),
            }),
        }
    }

    fn set_outcome(state: &RunnerState, outcome: TestOutcome) {
        if let Ok(mut slot) = state.outcome.lock() {
            *slot = outcome;
        }
    }
}

#[async_trait]
impl TestRunner for LocalProcessRunner {
    async fn start(&self) -> Result<(), StartError> {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return Err(StartError::AlreadyStarted);
        }
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| StartError::Other("empty command".to_string()))?;

        let devices: Vec<&str> =
            self.allocation.device_ids().iter().map(String::as_str).collect();
        let mut child = Command::new(program)
            .args(args)
            .env(ENV_JOB_ID, self.execution.job().id())
            .env(ENV_TEST_ID, self.execution.test_id())
            .env(ENV_DEVICE_IDS, devices.join(","))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(StartError::Spawn)?;

        let pid = child.id().unwrap_or(0);
        self.state.pid.store(pid, Ordering::SeqCst);
        self.state.running.store(true, Ordering::SeqCst);
        info!(
            test_id = self.execution.test_id(),
            pid,
            command = ?self.command,
            "test process started"
        );

        let state = Arc::clone(&self.state);
        let test_id = self.execution.test_id().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    let outcome = match status.code() {
                        Some(0) => TestOutcome::Passed,
                        Some(_) => TestOutcome::Failed,
                        // Killed by a signal: no recognized result.
                        None => TestOutcome::Unknown,
                    };
                    Self::set_outcome(&state, outcome);
                    info!(test_id, ?status, outcome = outcome.as_str(), "test process exited");
                }
                Err(err) => {
                    warn!(test_id, error = %err, "failed to await test process");
                }
            }
            state.running.store(false, Ordering::SeqCst);
            state.closed.store(true, Ordering::SeqCst);
        });

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    async fn kill(&self, escalate: bool) -> u32 {
        let attempts = self.state.kill_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let pid = self.state.pid.load(Ordering::SeqCst);
        if pid == 0 || !self.is_running() {
            return attempts;
        }

        let signal = if escalate && attempts >= FORCE_KILL_AFTER {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        info!(
            test_id = self.execution.test_id(),
            pid,
            attempts,
            signal = ?signal,
            "killing test process"
        );
        if let Err(err) = kill(NixPid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX)), signal) {
            // The process may have exited between the running check and the
            // signal; ESRCH here is expected.
            warn!(test_id = self.execution.test_id(), pid, error = %err, "kill signal failed");
        }
        attempts
    }

    fn execution_unit(&self) -> &ExecutionUnit {
        &self.execution
    }

    fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    fn outcome(&self) -> TestOutcome {
        self.state.outcome.lock().map_or(TestOutcome::Unknown, |slot| *slot)
    }
}
