//! Background reconciliation of the test registry.
//!
//! One dedicated tokio task sweeps the registry every tick: expired tests are
//! killed with escalation, finished tests are pruned, and executions stuck at
//! the escalation ceiling are reclaimed at the OS level and reported through
//! the alert throttle.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::models::SupervisorConfig;
use crate::domain::ports::{Clock, Sleeper, TestRunner};
use crate::services::{AlertThrottle, TestRegistry, ZombieReaper};

/// The supervisor's reconciliation loop.
///
/// Started once per process with [`ReconciliationLoop::start`] and stopped
/// with [`ReconciliationLoop::shutdown`]. Shutdown maps to the fatal path:
/// once the loop observes the signal during its sleep, supervision stops
/// permanently. A failing tick, by contrast, is logged and the loop proceeds.
pub struct ReconciliationLoop<R: TestRunner> {
    registry: Arc<TestRegistry<R>>,
    reaper: Arc<ZombieReaper>,
    alerts: Arc<AlertThrottle>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    config: SupervisorConfig,
    shutdown_tx: broadcast::Sender<()>,
    // Subscribed at construction so a shutdown sent before `start` is
    // buffered rather than lost.
    shutdown_rx: std::sync::Mutex<Option<broadcast::Receiver<()>>>,
}

impl<R: TestRunner> ReconciliationLoop<R> {
    /// Wire a loop over the given registry and collaborators.
    pub fn new(
        registry: Arc<TestRegistry<R>>,
        reaper: Arc<ZombieReaper>,
        alerts: Arc<AlertThrottle>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        config: SupervisorConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            registry,
            reaper,
            alerts,
            clock,
            sleeper,
            config,
            shutdown_tx,
            shutdown_rx: std::sync::Mutex::new(Some(shutdown_rx)),
        }
    }

    /// Spawn the background task. The returned handle completes only after
    /// shutdown.
    pub fn start(&self) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let reaper = Arc::clone(&self.reaper);
        let alerts = Arc::clone(&self.alerts);
        let clock = Arc::clone(&self.clock);
        let sleeper = Arc::clone(&self.sleeper);
        let config = self.config.clone();
        let mut shutdown_rx = self
            .shutdown_rx
            .lock()
            .ok()
            .and_then(|mut receiver| receiver.take())
            .unwrap_or_else(|| self.shutdown_tx.subscribe());

        tokio::spawn(async move {
            info!(
                check_interval_ms = config.check_interval_ms,
                escalation_ceiling = config.escalation_ceiling,
                "test reconciliation loop started"
            );

            loop {
                tokio::select! {
                    () = sleeper.sleep(config.check_interval()) => {}
                    _ = shutdown_rx.recv() => {
                        warn!("reconciliation loop interrupted during sleep; test supervision stops");
                        break;
                    }
                }

                // A bad tick must never terminate supervision; only the
                // shutdown signal above does.
                let tick = Self::tick(&registry, &reaper, &alerts, clock.as_ref(), &config);
                if AssertUnwindSafe(tick).catch_unwind().await.is_err() {
                    error!("reconciliation tick panicked; supervision continues");
                }
            }

            info!("test reconciliation loop stopped");
        })
    }

    /// One sweep-and-reclaim pass. Each stage handles its own failures, so a
    /// bad tick never terminates supervision.
    async fn tick(
        registry: &TestRegistry<R>,
        reaper: &ZombieReaper,
        alerts: &AlertThrottle,
        clock: &dyn Clock,
        config: &SupervisorConfig,
    ) {
        let report = registry.sweep(clock, config.escalation_ceiling).await;
        debug!(
            removed = report.removed.len(),
            zombies = report.zombies.len(),
            "reconciliation tick"
        );

        for zombie in &report.zombies {
            reaper.reclaim(zombie).await;
        }
        if !report.zombies.is_empty() {
            alerts.offer(&report.zombies).await;
        }
    }

    /// Signal the loop to stop. Idempotent; has no effect once the loop has
    /// already exited. A signal sent before [`ReconciliationLoop::start`] is
    /// buffered and stops the loop on its first tick boundary.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
