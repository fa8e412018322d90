//! Command-line interface for the `labsupd` binary.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Device-lab test execution supervisor daemon.
#[derive(Parser, Debug)]
#[command(name = "labsupd", version, about)]
pub struct Cli {
    /// Path to the configuration file (defaults to labsup.yaml plus
    /// LABSUP_* environment overrides).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the supervisor and the executions declared in the manifest.
    Run,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}
