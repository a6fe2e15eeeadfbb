//! Local credential profiles.
//!
//! Profiles live in a single JSON document (default
//! `~/.config/zerodha/config.json`) written atomically with owner-only
//! permissions, since it carries API secrets and access tokens.

use crate::atomic_file::{create_private_dir, set_private_permissions, write_private_atomic};
use crate::error::{CliError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Schema version written to every saved document.
pub const CONFIG_VERSION: u32 = 1;

/// Top-level config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Schema version.
    pub version: u32,
    /// Profile used when `--profile` is not given.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub active_profile: String,
    /// Named credential profiles, kept sorted by name.
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            active_profile: String::new(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Kite credentials for one account.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Kite Connect API key.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// Kite Connect API secret.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_secret: String,
    /// Session access token.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    /// Session refresh token.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    /// When the last login completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("Profile")
            .field("api_key", &self.api_key)
            .field("api_secret", &redact(&self.api_secret))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("last_login_at", &self.last_login_at)
            .finish()
    }
}

/// Trim a user-supplied profile name, rejecting blanks.
///
/// # Errors
///
/// Returns a validation error if the name is blank.
pub fn validate_profile_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::Validation("profile name cannot be empty".to_owned()));
    }
    Ok(name)
}

impl CliConfig {
    /// Add a profile or replace its credentials. The first profile, or one
    /// added with `set_active`, becomes active.
    pub fn upsert_credentials(
        &mut self,
        name: &str,
        api_key: &str,
        api_secret: &str,
        set_active: bool,
    ) {
        let profile = self.profiles.entry(name.to_owned()).or_default();
        profile.api_key = api_key.trim().to_owned();
        profile.api_secret = api_secret.trim().to_owned();
        if self.active_profile.is_empty() || set_active {
            self.active_profile = name.to_owned();
        }
    }

    /// Mutate an existing profile.
    ///
    /// # Errors
    ///
    /// Returns a config error if the profile does not exist.
    pub fn update_profile(&mut self, name: &str, update: impl FnOnce(&mut Profile)) -> Result<()> {
        let profile = self
            .profiles
            .get_mut(name)
            .ok_or_else(|| profile_not_found(name))?;
        update(profile);
        Ok(())
    }

    /// Make `name` the active profile.
    ///
    /// # Errors
    ///
    /// Returns a config error if the profile does not exist.
    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if !self.profiles.contains_key(name) {
            return Err(profile_not_found(name));
        }
        self.active_profile = name.to_owned();
        Ok(())
    }

    /// Delete a profile. If it was active, the first remaining profile (by
    /// name) becomes active, or none.
    ///
    /// # Errors
    ///
    /// Returns a config error if the profile does not exist.
    pub fn remove_profile(&mut self, name: &str) -> Result<()> {
        if self.profiles.remove(name).is_none() {
            return Err(profile_not_found(name));
        }
        if self.active_profile == name {
            self.active_profile = self.profiles.keys().next().cloned().unwrap_or_default();
        }
        Ok(())
    }
}

fn profile_not_found(name: &str) -> CliError {
    CliError::Config(format!("profile {name:?} not found"))
}

/// File-backed [`CliConfig`] store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the config document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, creating an empty owner-only file on first use. An
    /// empty file is initialized with the default document.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file cannot be created, read, or decoded.
    pub fn load(&self) -> Result<CliConfig> {
        self.ensure_file()?;

        let content = std::fs::read(&self.path)
            .map_err(|e| CliError::Config(format!("read config file: {e}")))?;
        if content.iter().all(u8::is_ascii_whitespace) {
            let cfg = CliConfig::default();
            self.save(&cfg)?;
            return Ok(cfg);
        }

        let mut cfg: CliConfig = serde_json::from_slice(&content)
            .map_err(|e| CliError::Config(format!("decode config file: {e}")))?;
        if cfg.version == 0 {
            cfg.version = CONFIG_VERSION;
        }
        Ok(cfg)
    }

    /// Atomically persist `cfg` with the current schema version.
    ///
    /// # Errors
    ///
    /// Returns a config error if the document cannot be written.
    pub fn save(&self, cfg: &CliConfig) -> Result<()> {
        let dir = self.ensure_dir()?;

        let mut cfg = cfg.clone();
        cfg.version = CONFIG_VERSION;
        let mut json = serde_json::to_vec_pretty(&cfg)
            .map_err(|e| CliError::Config(format!("encode config file: {e}")))?;
        json.push(b'\n');

        write_private_atomic(&dir, "config", &self.path, &json)
            .map_err(|e| CliError::Config(format!("write config file: {e}")))
    }

    fn ensure_dir(&self) -> Result<PathBuf> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
            _ => PathBuf::from("."),
        };
        create_private_dir(&dir)
            .map_err(|e| CliError::Config(format!("create config directory: {e}")))?;
        Ok(dir)
    }

    fn ensure_file(&self) -> Result<()> {
        self.ensure_dir()?;
        if self.path.exists() {
            return Ok(());
        }
        std::fs::write(&self.path, b"")
            .map_err(|e| CliError::Config(format!("create config file: {e}")))?;
        set_private_permissions(&self.path)
            .map_err(|e| CliError::Config(format!("set config permissions: {e}")))
    }
}
