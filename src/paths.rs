//! Centralized filesystem paths for the zerodha CLI.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/.config/zerodha/` | `~/.config/zerodha/` |
//! | Cache | `~/Library/Caches/zerodha/` | `~/.cache/zerodha/` |
//!
//! # Environment Overrides
//!
//! - `ZERODHA_CONFIG_DIR` overrides [`config_dir`]
//! - `ZERODHA_CACHE_DIR` overrides [`cache_dir`]

use crate::error::{CliError, Result};
use std::path::PathBuf;

/// Application name used for directory and binary naming.
pub const APP_NAME: &str = "zerodha";

/// Application config directory, `~/.config/zerodha` on every platform.
///
/// Holds `config.json` with credential profiles.
///
/// # Errors
///
/// Returns a config error if the home directory cannot be resolved and no
/// override is set.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(override_dir) = std::env::var_os("ZERODHA_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| CliError::Config("cannot resolve home directory".to_owned()))
}

/// Application cache directory. The updater keeps its state and staged
/// downloads under `cache_dir()/updater/`.
///
/// # Errors
///
/// Returns an internal error if no platform cache directory exists and no
/// override is set.
pub fn cache_dir() -> Result<PathBuf> {
    if let Some(override_dir) = std::env::var_os("ZERODHA_CACHE_DIR") {
        return Ok(PathBuf::from(override_dir));
    }
    dirs::cache_dir()
        .map(|d| d.join(APP_NAME))
        .ok_or_else(|| CliError::Internal("cannot resolve user cache directory".to_owned()))
}

/// Default config file path (`config_dir()/config.json`).
///
/// # Errors
///
/// See [`config_dir`].
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}
