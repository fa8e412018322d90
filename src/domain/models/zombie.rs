//! Ephemeral record of an execution that resisted termination.

use crate::domain::models::{Allocation, ExecutionUnit};

/// One execution whose kill-attempt count has reached the escalation ceiling.
///
/// Produced during a single reconciliation tick, grouped by owning job for
/// the alert pass, and never kept past that tick.
#[derive(Debug, Clone)]
pub struct ZombieRecord {
    execution: ExecutionUnit,
    allocation: Allocation,
    kill_attempts: u32,
}

impl ZombieRecord {
    /// Create a record for the given execution at its current attempt count.
    pub const fn new(execution: ExecutionUnit, allocation: Allocation, kill_attempts: u32) -> Self {
        Self { execution, allocation, kill_attempts }
    }

    /// The execution that resisted termination.
    pub const fn execution(&self) -> &ExecutionUnit {
        &self.execution
    }

    /// Devices bound to the execution.
    pub const fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    /// Consecutive kill attempts observed when the record was produced.
    pub const fn kill_attempts(&self) -> u32 {
        self.kill_attempts
    }
}
