//! Infrastructure adapters: OS process control, time, config, logging.

pub mod config;
pub mod local_runner;
pub mod logging;
pub mod process_inventory;
pub mod time;

pub use config::{ConfigError, ConfigLoader};
pub use local_runner::LocalProcessRunner;
pub use logging::Logger;
pub use process_inventory::SysinfoInventory;
pub use time::{SystemClock, TokioSleeper};
