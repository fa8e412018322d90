//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::domain::models::{Allocation, ExecutionManifest, ExecutionUnit, JobUnit, LabConfig};
use crate::domain::ports::runner::TestRunner;
use crate::domain::ports::Clock;
use crate::infrastructure::{
    ConfigLoader, LocalProcessRunner, Logger, SysinfoInventory, SystemClock, TokioSleeper,
};
use crate::services::{AlertThrottle, ReconciliationLoop, TestRegistry, ZombieReaper};

fn load_config(config_path: Option<&Path>) -> Result<LabConfig> {
    match config_path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Load and validate the configuration, then report.
pub fn check_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    println!(
        "configuration OK: {} execution(s), check interval {:?}, escalation ceiling {}",
        config.executions.len(),
        config.supervisor.check_interval(),
        config.supervisor.escalation_ceiling,
    );
    Ok(())
}

/// Run the supervisor until Ctrl-C.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let _logger = Logger::init(&config.logging).context("failed to initialize logging")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(TestRegistry::<LocalProcessRunner>::new());
    let inventory = Arc::new(SysinfoInventory::new());
    let reaper = Arc::new(ZombieReaper::new(
        inventory,
        Arc::clone(&clock),
        config.supervisor.snapshot_interval(),
    ));
    let alerts = Arc::new(AlertThrottle::new(Arc::clone(&clock), config.supervisor.alert_window()));
    let reconciliation = ReconciliationLoop::new(
        Arc::clone(&registry),
        reaper,
        alerts,
        Arc::clone(&clock),
        Arc::new(TokioSleeper),
        config.supervisor.clone(),
    );
    let loop_handle = reconciliation.start();

    for manifest in &config.executions {
        let runner = Arc::new(build_runner(manifest, clock.as_ref()));
        let test_id = runner.execution_unit().test_id().to_string();
        if let Err(err) = registry.start(runner).await {
            error!(test_id, error = %err, "failed to start execution from manifest");
        }
    }

    info!("labsupd running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown requested; killing remaining executions");

    for test_id in registry.running_test_ids().await {
        registry.kill_and_remove(&test_id).await;
    }
    reconciliation.shutdown();
    loop_handle.await.context("reconciliation loop panicked")?;
    Ok(())
}

fn build_runner(manifest: &ExecutionManifest, clock: &dyn Clock) -> LocalProcessRunner {
    let job_id =
        manifest.job_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let test_id =
        manifest.test_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = clock.now();

    let job = Arc::new(JobUnit::new(
        job_id,
        manifest.job_name.clone(),
        manifest.driver.clone(),
        now,
        std::time::Duration::from_secs(manifest.job_timeout_secs),
        std::time::Duration::from_secs(manifest.test_timeout_secs),
    ));
    let execution = ExecutionUnit::new(test_id.clone(), manifest.test_name.clone(), job, now);
    let allocation = Allocation::new(test_id, manifest.devices.iter().cloned());
    LocalProcessRunner::new(execution, allocation, manifest.command.clone())
}
