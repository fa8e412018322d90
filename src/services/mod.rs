//! Supervisor services: registry, reconciliation loop, reclamation, alerts.

pub mod alert_throttle;
pub mod reconciliation;
pub mod test_registry;
pub mod zombie_reaper;

pub use alert_throttle::AlertThrottle;
pub use reconciliation::ReconciliationLoop;
pub use test_registry::TestRegistry;
pub use zombie_reaper::ZombieReaper;
