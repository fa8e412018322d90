//! Configuration loading for the `labsupd` binary.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::LabConfig;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Tick interval must be positive.
    #[error("check_interval_ms must be positive")]
    ZeroCheckInterval,

    /// Escalation ceiling must be positive.
    #[error("escalation_ceiling must be positive")]
    ZeroEscalationCeiling,

    /// Alert window must be positive.
    #[error("alert_window_secs must be positive")]
    ZeroAlertWindow,

    /// Log level must be a recognized tracing level.
    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Log format must be recognized.
    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Every manifest entry needs a command to execute.
    #[error("execution [{0}] has an empty command")]
    EmptyCommand(String),

    /// Manifest test ids must be unique.
    #[error("duplicate test id in manifest: {0}")]
    DuplicateTestId(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `labsup.yaml` in the working directory
    /// 3. Environment variables (`LABSUP_` prefix)
    pub fn load() -> Result<LabConfig> {
        let config: LabConfig = Figment::new()
            .merge(Serialized::defaults(LabConfig::default()))
            .merge(Yaml::file("labsup.yaml"))
            .merge(Env::prefixed("LABSUP_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<LabConfig> {
        let config: LabConfig = Figment::new()
            .merge(Serialized::defaults(LabConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &LabConfig) -> Result<(), ConfigError> {
        if config.supervisor.check_interval_ms == 0 {
            return Err(ConfigError::ZeroCheckInterval);
        }
        if config.supervisor.escalation_ceiling == 0 {
            return Err(ConfigError::ZeroEscalationCeiling);
        }
        if config.supervisor.alert_window_secs == 0 {
            return Err(ConfigError::ZeroAlertWindow);
        }
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }

        let mut seen = HashSet::new();
        for execution in &config.executions {
            if execution.command.is_empty() {
                return Err(ConfigError::EmptyCommand(execution.test_name.clone()));
            }
            if let Some(test_id) = &execution.test_id {
                if !seen.insert(test_id.clone()) {
                    return Err(ConfigError::DuplicateTestId(test_id.clone()));
                }
            }
        }
        Ok(())
    }
}
