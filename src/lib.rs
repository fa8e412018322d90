//! Labsup - Device-Lab Test Execution Supervisor
//!
//! Labsup tracks every test execution handed to a device-lab worker until it
//! finishes or is forcibly terminated: a registry of active runners, a
//! background reconciliation loop for timeout detection and pruning, a kill
//! escalation protocol, OS-level zombie reclamation, and rate-limited
//! alerting for executions that resist termination.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, error taxonomy, and ports (the
//!   `TestRunner`, `ProcessInventory`, `Clock`, and `Sleeper` traits).
//! - **Service Layer** (`services`): the supervisor proper - test registry,
//!   reconciliation loop, zombie reaper, alert throttle.
//! - **Infrastructure Layer** (`infrastructure`): OS-backed adapters and
//!   config/logging setup.
//! - **CLI Layer** (`cli`): the `labsupd` binary surface.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use labsup::services::{ReconciliationLoop, TestRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(TestRegistry::new());
//!     // Wire a ReconciliationLoop over the registry and start it, then hand
//!     // runners to `registry.start(...)` from RPC handlers.
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::error::{InventoryError, StartError, SupervisorError};
pub use domain::models::{
    Allocation, ExecutionUnit, JobUnit, LabConfig, SupervisorConfig, TestOutcome, Timer,
    ZombieRecord,
};
pub use domain::ports::{Clock, Pid, ProcessInventory, Sleeper, TestRunner};
pub use infrastructure::{ConfigLoader, LocalProcessRunner, Logger, SysinfoInventory};
pub use services::{AlertThrottle, ReconciliationLoop, TestRegistry, ZombieReaper};
