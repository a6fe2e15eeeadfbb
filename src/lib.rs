//! zerodha: command-line client for Zerodha Kite Connect.
//!
//! Besides the command surface, the crate carries a self-update manager that
//! keeps the installed binary current:
//!
//! - **Release check**: queries the GitHub "latest release" feed
//! - **Staging**: downloads the platform asset into the cache directory
//! - **Swap**: replaces the running executable, directly or via a helper
//!   process on Windows
//! - **State**: remembers checks, downloads, and failures across runs

pub mod atomic_file;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod paths;
pub mod update;

pub use config::{CliConfig, ConfigStore, Profile};
pub use error::{CliError, Result};
pub use output::Printer;
