use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the test execution supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Reconciliation tick interval in milliseconds.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Kill-attempt count after which cooperative termination is deemed
    /// failed and OS-level reclamation begins.
    #[serde(default = "default_escalation_ceiling")]
    pub escalation_ceiling: u32,

    /// Minimum seconds between aggregated zombie alerts.
    #[serde(default = "default_alert_window_secs")]
    pub alert_window_secs: u64,

    /// Minimum seconds between process-table diagnostic snapshots.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

const fn default_check_interval_ms() -> u64 {
    2_000
}

const fn default_escalation_ceiling() -> u32 {
    30
}

const fn default_alert_window_secs() -> u64 {
    60
}

const fn default_snapshot_interval_secs() -> u64 {
    300
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            escalation_ceiling: default_escalation_ceiling(),
            alert_window_secs: default_alert_window_secs(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

impl SupervisorConfig {
    /// Reconciliation tick interval.
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Aggregated-alert suppression window.
    pub const fn alert_window(&self) -> Duration {
        Duration::from_secs(self.alert_window_secs)
    }

    /// Diagnostic snapshot throttle interval.
    pub const fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: pretty or json.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling file logs. Stdout-only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// One test execution declared in the lab manifest, run by the `labsupd`
/// binary under the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionManifest {
    /// Test id; generated when omitted.
    #[serde(default)]
    pub test_id: Option<String>,

    /// Human-readable test name.
    pub test_name: String,

    /// Owning job id; generated when omitted.
    #[serde(default)]
    pub job_id: Option<String>,

    /// Human-readable job name.
    pub job_name: String,

    /// Name of the driver executing the test.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Device ids allocated to the test.
    #[serde(default)]
    pub devices: Vec<String>,

    /// Command line to execute, program first.
    pub command: Vec<String>,

    /// Test timeout budget in seconds.
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,

    /// Job timeout budget in seconds.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_driver() -> String {
    "LocalCommand".to_string()
}

const fn default_test_timeout_secs() -> u64 {
    600
}

const fn default_job_timeout_secs() -> u64 {
    3_600
}

/// Top-level configuration for the `labsupd` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LabConfig {
    /// Supervisor tuning.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Executions to start at boot.
    #[serde(default)]
    pub executions: Vec<ExecutionManifest>,
}
