//! Ports (trait interfaces) consumed by the supervisor.

pub mod process_inventory;
pub mod runner;
pub mod time;

pub use process_inventory::{Pid, ProcessInventory};
pub use runner::TestRunner;
pub use time::{Clock, Sleeper};
