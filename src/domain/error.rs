use std::collections::BTreeSet;

use thiserror::Error;

/// Errors surfaced by the supervisor to its callers.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A start request named a test id that already has a live registry entry.
    #[error("test [{0}] is already running")]
    AlreadyRunning(String),

    /// An internal accessor was asked for a test id with no registry entry.
    #[error("test [{0}] not found")]
    TestNotFound(String),

    /// The allocation presented by a caller disagrees with the allocation
    /// bound to the registered runner. This indicates allocation bookkeeping
    /// corruption elsewhere in the system and is never silently reconciled.
    #[error(
        "allocation for test [{test_id}] does not match the registered runner: \
         registered devices {registered:?}, presented {presented:?}"
    )]
    DuplicatedAllocation {
        /// Test id named by both allocations.
        test_id: String,
        /// Device ids bound to the registered runner.
        registered: BTreeSet<String>,
        /// Device ids presented by the caller.
        presented: BTreeSet<String>,
    },

    /// The runner failed to start after its registry entry was created.
    /// The entry is removed again before this error is returned.
    #[error("failed to start test [{test_id}]")]
    Start {
        /// Test id of the runner that failed to start.
        test_id: String,
        /// Underlying runner failure.
        #[source]
        source: StartError,
    },
}

/// Errors a runner can report from its `start` operation.
#[derive(Error, Debug)]
pub enum StartError {
    /// The underlying test process could not be spawned.
    #[error("failed to spawn test process")]
    Spawn(#[source] std::io::Error),

    /// `start` was called on a runner that has already been started.
    #[error("runner has already been started")]
    AlreadyStarted,

    /// Variant-specific failure with no more precise classification.
    #[error("{0}")]
    Other(String),
}

/// Errors from the process inventory. Always treated as recoverable: callers
/// log a warning and stop the current reclamation pass.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Enumerating OS processes failed.
    #[error("failed to enumerate processes: {0}")]
    Enumerate(String),

    /// Delivering a termination signal failed.
    #[error("failed to signal pid {pid}: {reason}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Platform error text.
        reason: String,
    },

    /// The process id is not present in the inventory.
    #[error("pid {0} not found")]
    NotFound(u32),
}
