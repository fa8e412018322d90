//! Test runner port.

use async_trait::async_trait;

use crate::domain::error::StartError;
use crate::domain::models::{Allocation, ExecutionUnit, TestOutcome};

/// Capability that owns and controls one running test execution.
///
/// The supervisor is generic over the concrete variant (local process,
/// containerized, remote proxy); it only relies on this contract. `start` and
/// `kill` may block on external I/O such as process spawn or signal delivery.
#[async_trait]
pub trait TestRunner: Send + Sync + 'static {
    /// Start the execution. Called at most once per runner, by the registry,
    /// after the registry entry has been created.
    async fn start(&self) -> Result<(), StartError>;

    /// Whether the execution is currently running.
    fn is_running(&self) -> bool;

    /// Whether the execution has released all its resources. A runner that is
    /// simultaneously not running and closed is eligible for registry removal.
    fn is_closed(&self) -> bool;

    /// Request termination of the execution and return the number of
    /// consecutive kill attempts made so far, including this one. The attempt
    /// counter is owned by the runner, not the supervisor.
    ///
    /// With `escalate` set, the runner may use progressively harsher
    /// mechanisms on repeated calls; without it, a single cooperative
    /// termination is requested.
    async fn kill(&self, escalate: bool) -> u32;

    /// The execution unit this runner was created for.
    fn execution_unit(&self) -> &ExecutionUnit;

    /// The device allocation bound to this execution.
    fn allocation(&self) -> &Allocation;

    /// Result of the execution as far as the runner knows. Remains
    /// [`TestOutcome::Unknown`] until the execution finishes with a
    /// recognized result.
    fn outcome(&self) -> TestOutcome;
}
