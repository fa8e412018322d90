//! Process inventory backed by the OS process table.
//!
//! Test processes spawned by [`crate::infrastructure::LocalProcessRunner`]
//! are tagged with `LABSUP_JOB_ID`, `LABSUP_TEST_ID`, and `LABSUP_DEVICE_IDS`
//! environment variables; this adapter associates processes with a test or a
//! device by scanning for those markers.

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use sysinfo::{PidExt, Process, ProcessExt, System, SystemExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::error::InventoryError;
use crate::domain::ports::{Pid, ProcessInventory};

/// Environment variable carrying the owning job id.
pub const ENV_JOB_ID: &str = "LABSUP_JOB_ID";
/// Environment variable carrying the test id.
pub const ENV_TEST_ID: &str = "LABSUP_TEST_ID";
/// Environment variable carrying the comma-separated allocated device ids.
pub const ENV_DEVICE_IDS: &str = "LABSUP_DEVICE_IDS";

/// sysinfo-backed [`ProcessInventory`].
pub struct SysinfoInventory {
    system: Mutex<System>,
}

impl Default for SysinfoInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoInventory {
    /// Create an inventory over a fresh process table.
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }

    async fn matching<F>(&self, predicate: F) -> Vec<Pid>
    where
        F: Fn(&Process) -> bool,
    {
        let mut system = self.system.lock().await;
        system.refresh_processes();
        system
            .processes()
            .iter()
            .filter(|(_, process)| predicate(process))
            .map(|(pid, _)| pid.as_u32())
            .collect()
    }
}

fn env_value<'a>(process: &'a Process, key: &str) -> Option<&'a str> {
    process
        .environ()
        .iter()
        .find_map(|entry| entry.strip_prefix(key)?.strip_prefix('='))
}

fn has_device(process: &Process, device_id: &str) -> bool {
    env_value(process, ENV_DEVICE_IDS)
        .is_some_and(|devices| devices.split(',').any(|device| device == device_id))
}

#[async_trait]
impl ProcessInventory for SysinfoInventory {
    async fn pids_for_test(
        &self,
        job_id: &str,
        test_id: &str,
    ) -> Result<Vec<Pid>, InventoryError> {
        let pids = self
            .matching(|process| {
                env_value(process, ENV_JOB_ID) == Some(job_id)
                    && env_value(process, ENV_TEST_ID) == Some(test_id)
            })
            .await;
        debug!(job_id, test_id, ?pids, "enumerated test processes");
        Ok(pids)
    }

    async fn pids_for_device(&self, device_id: &str) -> Result<Vec<Pid>, InventoryError> {
        let pids = self.matching(|process| has_device(process, device_id)).await;
        debug!(device_id, ?pids, "enumerated device processes");
        Ok(pids)
    }

    async fn terminate(&self, pid: Pid) -> Result<(), InventoryError> {
        // Cooperative termination has already failed by the time the
        // inventory is asked to reclaim, so go straight to SIGKILL.
        kill(NixPid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX)), Signal::SIGKILL).map_err(
            |err| InventoryError::Signal { pid, reason: err.to_string() },
        )
    }

    async fn describe(&self, pid: Pid) -> Result<String, InventoryError> {
        let mut system = self.system.lock().await;
        system.refresh_processes();
        let process = system
            .process(sysinfo::Pid::from_u32(pid))
            .ok_or(InventoryError::NotFound(pid))?;
        Ok(format!(
            "pid={} name={:?} status={:?} parent={:?} cmd={:?}",
            pid,
            process.name(),
            process.status(),
            process.parent(),
            process.cmd(),
        ))
    }
}
