//! Process inventory port.

use async_trait::async_trait;

use crate::domain::error::InventoryError;

/// OS process id.
pub type Pid = u32;

/// Enumerates and terminates OS processes on behalf of zombie reclamation.
///
/// How processes are associated with a test or a device is an implementation
/// concern of the adapter; the supervisor only relies on this contract. All
/// operations are best-effort from the supervisor's point of view: failures
/// are logged and never escalated past the current reclamation pass.
#[async_trait]
pub trait ProcessInventory: Send + Sync {
    /// Process ids associated with the given (job id, test id) pair.
    async fn pids_for_test(&self, job_id: &str, test_id: &str)
        -> Result<Vec<Pid>, InventoryError>;

    /// Process ids associated with the given device id.
    async fn pids_for_device(&self, device_id: &str) -> Result<Vec<Pid>, InventoryError>;

    /// Send a termination signal to the process.
    async fn terminate(&self, pid: Pid) -> Result<(), InventoryError>;

    /// Human-readable description of the process, for diagnostics.
    async fn describe(&self, pid: Pid) -> Result<String, InventoryError>;
}
