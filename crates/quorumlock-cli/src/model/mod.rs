//! Command line, configuration and command output models.

pub mod config;
pub mod report;

pub use config::{AcquireArgs, Cli, Command, Configuration, DEFAULT_CONFIG_FILE};
pub use report::{AcquireReport, HoldReport, PingReport, ReleaseReport, StatusReport, StoreValue};
