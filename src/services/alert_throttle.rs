//! Rate-limited aggregation of zombie notifications.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::models::ZombieRecord;
use crate::domain::ports::Clock;

/// Aggregates zombie records from one tick and emits at most one log entry
/// per alerting window.
///
/// A purely diagnostic sink: it never touches registry state and never blocks
/// the reconciliation loop.
pub struct AlertThrottle {
    clock: Arc<dyn Clock>,
    window: Duration,
    last_alert: Mutex<Option<DateTime<Utc>>>,
    emitted: AtomicU64,
}

impl AlertThrottle {
    /// Create a throttle emitting at most once per `window`.
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self { clock, window, last_alert: Mutex::new(None), emitted: AtomicU64::new(0) }
    }

    /// Offer this tick's zombie records. Emits one aggregated entry, grouped
    /// by owning job, when the records are non-empty and the previous alert
    /// is at least one window in the past. Returns whether an alert was
    /// emitted.
    pub async fn offer(&self, zombies: &[ZombieRecord]) -> bool {
        if zombies.is_empty() {
            return false;
        }
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        {
            let mut last_alert = self.last_alert.lock().await;
            if let Some(previous) = *last_alert {
                if now.signed_duration_since(previous) < window {
                    debug!(suppressed = zombies.len(), "zombie alert suppressed inside window");
                    return false;
                }
            }
            *last_alert = Some(now);
        }

        warn!(
            zombie_count = zombies.len(),
            "{}",
            Self::render(zombies)
        );
        self.emitted.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Number of aggregated alerts emitted so far.
    pub fn emitted_alerts(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }

    fn render(zombies: &[ZombieRecord]) -> String {
        let mut by_job: BTreeMap<&str, Vec<&ZombieRecord>> = BTreeMap::new();
        for record in zombies {
            by_job.entry(record.execution().job().id()).or_default().push(record);
        }

        let mut out = String::from("tests resisting termination:");
        for (job_id, records) in by_job {
            let job = records[0].execution().job();
            let _ = write!(
                out,
                "\n  job [{job_id}] name={} driver={} created_at={} \
                 job_timeout={:?} test_timeout={:?} zombies={}",
                job.name(),
                job.driver(),
                job.created_at().to_rfc3339(),
                job.job_timeout(),
                job.test_timeout(),
                records.len(),
            );
            for record in records {
                let _ = write!(
                    out,
                    "\n    test [{}] name={} started_at={} devices={:?} kill_attempts={}",
                    record.execution().test_id(),
                    record.execution().name(),
                    record.execution().timer().start_time().to_rfc3339(),
                    record.allocation().device_ids(),
                    record.kill_attempts(),
                );
            }
        }
        out
    }
}
