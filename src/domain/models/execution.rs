//! Identity and timeout model for one test execution and its owning job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::ports::Clock;

/// Deadline tracker bound to one timeout budget.
///
/// A timer is created with a start instant and a duration budget and answers
/// whether the deadline has passed and how much time remains, against a
/// caller-supplied [`Clock`]. One timer is bound per test and one per job.
#[derive(Debug, Clone)]
pub struct Timer {
    start: DateTime<Utc>,
    budget: Duration,
}

impl Timer {
    /// Create a timer starting at `start` with the given budget.
    pub const fn new(start: DateTime<Utc>, budget: Duration) -> Self {
        Self { start, budget }
    }

    /// Instant the timer started.
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    /// Instant the budget runs out.
    pub fn expire_time(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.budget)
            .ok()
            .and_then(|budget| self.start.checked_add_signed(budget))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.expire_time()
    }

    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        (self.expire_time() - clock.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Identity of the job that owns one or more test executions. Read-only from
/// the supervisor's perspective.
#[derive(Debug, Clone)]
pub struct JobUnit {
    id: String,
    name: String,
    driver: String,
    created_at: DateTime<Utc>,
    job_timeout: Duration,
    test_timeout: Duration,
}

impl JobUnit {
    /// Create a job unit.
    pub const fn new(
        id: String,
        name: String,
        driver: String,
        created_at: DateTime<Utc>,
        job_timeout: Duration,
        test_timeout: Duration,
    ) -> Self {
        Self { id, name, driver, created_at, job_timeout, test_timeout }
    }

    /// Job id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the driver executing this job's tests.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Instant the job was created.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Job-level timeout budget.
    pub const fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// Per-test timeout budget configured on the job.
    pub const fn test_timeout(&self) -> Duration {
        self.test_timeout
    }

    /// Timer for the job's own budget, starting at the job's creation time.
    pub fn timer(&self) -> Timer {
        Timer::new(self.created_at, self.job_timeout)
    }
}

/// Identity of one test execution. Immutable after creation; owned by the
/// runner created for it.
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    test_id: String,
    name: String,
    job: Arc<JobUnit>,
    timer: Timer,
}

impl ExecutionUnit {
    /// Create an execution unit whose timer starts at `started_at` with the
    /// job's per-test budget.
    pub fn new(test_id: String, name: String, job: Arc<JobUnit>, started_at: DateTime<Utc>) -> Self {
        let timer = Timer::new(started_at, job.test_timeout());
        Self { test_id, name, job, timer }
    }

    /// Test id.
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Human-readable test name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning job.
    pub fn job(&self) -> &Arc<JobUnit> {
        &self.job
    }

    /// Timer bound to the test's own timeout.
    pub const fn timer(&self) -> &Timer {
        &self.timer
    }
}

/// Result of a finished execution as reported by its runner.
///
/// An execution that finished under expiry conditions while still reporting
/// [`TestOutcome::Unknown`] is treated conservatively: logged at high
/// severity, then forcibly terminated anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    /// No recognized result yet (still running, or finished ambiguously).
    Unknown,
    /// The test passed.
    Passed,
    /// The test failed.
    Failed,
    /// The test ran out of its timeout budget.
    Timeout,
    /// The test was skipped.
    Skipped,
}

impl TestOutcome {
    /// Stable lower-case name, for log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        }
    }
}
