//! Device allocation bound to a test execution.

use std::collections::BTreeSet;

/// The set of device ids bound to a running test for its duration.
///
/// Allocations are compared by device-id set when a caller asks whether a
/// test is running; a mismatch between the caller's allocation and the one
/// bound to the registered runner is an invariant violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    test_id: String,
    device_ids: BTreeSet<String>,
}

impl Allocation {
    /// Create an allocation for `test_id` over the given devices.
    pub fn new(test_id: String, device_ids: impl IntoIterator<Item = String>) -> Self {
        Self { test_id, device_ids: device_ids.into_iter().collect() }
    }

    /// Test id this allocation belongs to.
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Device ids in the allocation.
    pub const fn device_ids(&self) -> &BTreeSet<String> {
        &self.device_ids
    }
}
