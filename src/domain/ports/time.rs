//! Time ports.
//!
//! The supervisor never reads the wall clock or sleeps directly; it goes
//! through these traits so that timeout detection and alert gating can be
//! driven deterministically in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Interruptible sleep primitive used for the reconciliation loop's tick
/// interval.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}
