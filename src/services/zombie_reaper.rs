//! OS-level reclamation of executions that resisted cooperative termination.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sysinfo::{ProcessExt, System, SystemExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::error::InventoryError;
use crate::domain::models::ZombieRecord;
use crate::domain::ports::{Clock, Pid, ProcessInventory};

/// Reclaims the OS processes of a zombie execution.
///
/// Everything here is best-effort: inventory failures abort only the current
/// pass with a warning, and reclamation is idempotent, so re-triggering for
/// an execution stuck above the escalation ceiling is harmless.
pub struct ZombieReaper {
    inventory: Arc<dyn ProcessInventory>,
    clock: Arc<dyn Clock>,
    snapshot_interval: Duration,
    last_snapshot: Mutex<Option<DateTime<Utc>>>,
    render_snapshot: fn() -> String,
}

impl ZombieReaper {
    /// Create a reaper over the given inventory. `snapshot_interval` bounds
    /// how often the process-wide diagnostic snapshot is logged.
    pub fn new(
        inventory: Arc<dyn ProcessInventory>,
        clock: Arc<dyn Clock>,
        snapshot_interval: Duration,
    ) -> Self {
        Self {
            inventory,
            clock,
            snapshot_interval,
            last_snapshot: Mutex::new(None),
            render_snapshot: render_process_snapshot,
        }
    }

    #[cfg(test)]
    fn with_snapshot_renderer(mut self, render_snapshot: fn() -> String) -> Self {
        self.render_snapshot = render_snapshot;
        self
    }

    /// Run one reclamation pass for the given zombie.
    pub async fn reclaim(&self, zombie: &ZombieRecord) {
        self.maybe_log_process_snapshot().await;

        let test_id = zombie.execution().test_id();
        if let Err(err) = self.reclaim_inner(zombie).await {
            warn!(test_id, error = %err, "zombie reclamation aborted for this tick");
        }
    }

    async fn reclaim_inner(&self, zombie: &ZombieRecord) -> Result<(), InventoryError> {
        let test_id = zombie.execution().test_id();
        let pids = self.collect_pids(zombie).await?;
        if pids.is_empty() {
            info!(test_id, "no leftover processes to reclaim");
            return Ok(());
        }

        for pid in &pids {
            match self.inventory.describe(*pid).await {
                Ok(description) => {
                    info!(test_id, pid, %description, "terminating leftover process");
                }
                Err(err) => {
                    warn!(test_id, pid, error = %err, "could not describe leftover process");
                }
            }
            if let Err(err) = self.inventory.terminate(*pid).await {
                warn!(test_id, pid, error = %err, "failed to terminate leftover process");
            }
        }

        let remaining = self.collect_pids(zombie).await?;
        let reclaimed: Vec<Pid> = pids.difference(&remaining).copied().collect();
        info!(test_id, ?reclaimed, "reclaimed leftover processes");
        if !remaining.is_empty() {
            info!(
                test_id,
                remaining = ?remaining,
                "processes still alive after reclamation; operator investigation needed"
            );
        }
        Ok(())
    }

    /// Union of inventory pids for the (job, test) pair and every allocated
    /// device.
    async fn collect_pids(&self, zombie: &ZombieRecord) -> Result<BTreeSet<Pid>, InventoryError> {
        let job_id = zombie.execution().job().id();
        let test_id = zombie.execution().test_id();
        let mut pids: BTreeSet<Pid> =
            self.inventory.pids_for_test(job_id, test_id).await?.into_iter().collect();
        for device_id in zombie.allocation().device_ids() {
            pids.extend(self.inventory.pids_for_device(device_id).await?);
        }
        Ok(pids)
    }

    /// Log a process-table snapshot of this process and its children,
    /// throttled process-wide to bound log volume under sustained failure.
    async fn maybe_log_process_snapshot(&self) {
        let now = self.clock.now();
        let interval =
            chrono::Duration::from_std(self.snapshot_interval).unwrap_or(chrono::Duration::MAX);
        let mut last_snapshot = self.last_snapshot.lock().await;
        if let Some(previous) = *last_snapshot {
            if now.signed_duration_since(previous) < interval {
                return;
            }
        }

        // The timestamp is recorded only on success, so a failed capture
        // does not suppress diagnostics for a whole interval.
        match tokio::task::spawn_blocking(self.render_snapshot).await {
            Ok(snapshot) => {
                *last_snapshot = Some(now);
                warn!("diagnostic process snapshot before reclamation:\n{snapshot}");
            }
            Err(err) => warn!(error = %err, "failed to capture process snapshot"),
        }
    }

    #[cfg(test)]
    pub(crate) async fn last_snapshot_at(&self) -> Option<DateTime<Utc>> {
        *self.last_snapshot.lock().await
    }
}

/// Render the supervisor process and its direct children from the OS process
/// table.
fn render_process_snapshot() -> String {
    let mut system = System::new();
    system.refresh_processes();

    let own_pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(err) => return format!("current pid unavailable: {err}"),
    };

    let mut out = format!("process table ({} processes total)", system.processes().len());
    for (pid, process) in system.processes() {
        let own = *pid == own_pid;
        let child = process.parent() == Some(own_pid);
        if !own && !child {
            continue;
        }
        let _ = write!(
            out,
            "\n  pid={} parent={:?} name={:?} status={:?} cmd={:?}{}",
            pid,
            process.parent(),
            process.name(),
            process.status(),
            process.cmd(),
            if own { " (supervisor)" } else { "" },
        );
    }
    out
}
