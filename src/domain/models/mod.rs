//! Domain models for the test execution supervisor.

pub mod allocation;
pub mod config;
pub mod execution;
pub mod zombie;

pub use allocation::Allocation;
pub use config::{ExecutionManifest, LabConfig, LoggingConfig, SupervisorConfig};
pub use execution::{ExecutionUnit, JobUnit, TestOutcome, Timer};
pub use zombie::ZombieRecord;
