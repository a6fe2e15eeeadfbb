//! Update orchestration.
//!
//! One cycle runs: load state → finish any staged swap → cooldown gate →
//! release check → download and stage → swap → persist. Every failure is
//! written to the state file before it is returned, and progress that was
//! already persisted (a staged download, `apply_pending`) survives later
//! failures so the next cycle can pick it up.
//!
//! The background entry point is fire-and-forget: the spawned task has no
//! result channel, and its outcome is only observable through
//! [`load_state`] afterwards.

use super::applier::{BinarySwapper, HELPER_ENV_VAR, SwapOutcome, SwapRequest};
use super::checker::{Platform, fetch_latest_release, select_asset};
use super::download::{download_asset, set_executable};
use super::state::{StateStore, UpdateState};
use super::version::is_newer;
use crate::error::{CliError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// GitHub owner of the release feed.
pub const DEFAULT_REPO_OWNER: &str = "jatinbansal1998";
/// GitHub repository of the release feed.
pub const DEFAULT_REPO_NAME: &str = "zerodha-kite-cli";
/// Minimum time between background release checks.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(12 * 60 * 60);
/// Per-request timeout for the release check and the download.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
/// Setting this to `1|true|yes|on` disables background updates.
pub const DISABLE_ENV_VAR: &str = "ZERODHA_AUTO_UPDATE_DISABLED";

/// Version of the running binary. Release builds stamp it through
/// `ZERODHA_VERSION` at compile time.
pub fn running_version() -> &'static str {
    match option_env!("ZERODHA_BUILD_VERSION") {
        Some(v) => v,
        None => concat!("v", env!("CARGO_PKG_VERSION")),
    }
}

/// Process-wide updater switches, resolved once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Background updates disabled by the operator.
    pub disabled: bool,
    /// This process is the swap helper and must not start another cycle.
    pub helper_mode: bool,
}

impl UpdaterConfig {
    /// Read [`DISABLE_ENV_VAR`] and [`HELPER_ENV_VAR`] from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the switches through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).is_some_and(|v| env_flag_enabled(&v));
        Self {
            disabled: flag(DISABLE_ENV_VAR),
            helper_mode: flag(HELPER_ENV_VAR),
        }
    }

    /// Returns `true` if a background cycle may be started.
    pub fn background_enabled(&self) -> bool {
        !self.disabled && !self.helper_mode
    }
}

/// Returns `true` for `1`, `true`, `yes`, or `on` (case-insensitive).
pub fn env_flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Caller-supplied inputs for an update cycle. Blank or zero fields fall back
/// to the defaults in this module; version, executable, and cache directory
/// are required.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Version of the running binary.
    pub current_version: String,
    /// Path of the running executable.
    pub executable_path: PathBuf,
    /// Cache directory owning `updater/`.
    pub cache_dir: PathBuf,
    /// Release feed owner.
    pub repo_owner: String,
    /// Release feed repository.
    pub repo_name: String,
    /// Release API base URL (empty = GitHub).
    pub api_base_url: String,
    /// Minimum time between unforced checks.
    pub cooldown: Duration,
    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,
    /// HTTP client to reuse.
    pub http_client: Option<reqwest::Client>,
    /// Target platform override (defaults to the compiled platform).
    pub platform: Option<Platform>,
    /// Swap strategy override (defaults to the platform strategy).
    pub swapper: Option<BinarySwapper>,
}

impl UpdateOptions {
    /// Options for the installed binary: running version, current executable,
    /// and the given cache directory.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the executable path cannot be determined.
    pub fn for_current_exe(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let executable_path = std::env::current_exe()
            .map_err(|e| CliError::Internal(format!("resolve executable path: {e}")))?;
        Ok(Self {
            current_version: running_version().to_owned(),
            executable_path,
            cache_dir: cache_dir.into(),
            ..Default::default()
        })
    }
}

/// Runs update cycles with fully resolved options.
#[derive(Debug, Clone)]
pub struct UpdateManager {
    current_version: String,
    executable_path: PathBuf,
    cache_dir: PathBuf,
    repo_owner: String,
    repo_name: String,
    api_base_url: String,
    cooldown: Duration,
    request_timeout: Duration,
    client: reqwest::Client,
    platform: Platform,
    swapper: BinarySwapper,
}

impl UpdateManager {
    /// Resolve `options` against the defaults.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the version, executable, or cache
    /// directory is blank, and an internal error if no HTTP client can be
    /// built.
    pub fn new(options: UpdateOptions) -> Result<Self> {
        let current_version = options.current_version.trim().to_owned();
        if current_version.is_empty()
            || is_blank_path(&options.executable_path)
            || is_blank_path(&options.cache_dir)
        {
            return Err(CliError::Validation("update options are incomplete".to_owned()));
        }

        let or_default = |value: String, default: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default.to_owned()
            } else {
                trimmed.to_owned()
            }
        };
        let non_zero = |value: Duration, default: Duration| {
            if value.is_zero() { default } else { value }
        };

        let client = match options.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(DEFAULT_REQUEST_TIMEOUT)
                .build()
                .map_err(|e| CliError::Internal(format!("build HTTP client: {e}")))?,
        };
        let swapper = options
            .swapper
            .unwrap_or_else(|| BinarySwapper::for_current_platform(&options.executable_path));

        Ok(Self {
            current_version,
            executable_path: options.executable_path,
            cache_dir: options.cache_dir,
            repo_owner: or_default(options.repo_owner, DEFAULT_REPO_OWNER),
            repo_name: or_default(options.repo_name, DEFAULT_REPO_NAME),
            api_base_url: options.api_base_url.trim().to_owned(),
            cooldown: non_zero(options.cooldown, DEFAULT_COOLDOWN),
            request_timeout: non_zero(options.request_timeout, DEFAULT_REQUEST_TIMEOUT),
            client,
            platform: options.platform.unwrap_or_else(Platform::current),
            swapper,
        })
    }

    /// Run one update cycle. `force_check` bypasses the cooldown gate.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error after recording it in the
    /// state file.
    pub async fn run(&self, force_check: bool) -> Result<UpdateState> {
        let store = StateStore::new(&self.cache_dir);
        let mut state = match store.load() {
            Ok(state) => state,
            Err(e) => return Err(fail(&store, &mut UpdateState::default(), e)),
        };
        state.current_version = self.current_version.clone();

        // A half-finished previous cycle resolves before anything else.
        if let Err(e) = self.apply_staged(&store, &mut state) {
            return Err(fail(&store, &mut state, e));
        }

        let now = Utc::now();
        if !force_check && !state.check_is_stale(now, self.cooldown) {
            tracing::debug!("release check skipped: within cooldown");
            persist(&store, &mut state);
            return Ok(state);
        }

        let fetched = fetch_latest_release(
            &self.client,
            &self.api_base_url,
            &self.repo_owner,
            &self.repo_name,
            self.request_timeout,
        )
        .await;
        // A failed check still consumes the cooldown window.
        state.last_checked_at = Some(now);
        let release = match fetched {
            Ok(release) => release,
            Err(e) => return Err(fail(&store, &mut state, e)),
        };
        state.latest_version_seen = release.tag_name.clone();

        if !is_newer(&release.tag_name, &self.current_version) {
            tracing::debug!(
                "no newer release ({} vs {})",
                release.tag_name,
                self.current_version
            );
            state.clear_error();
            persist(&store, &mut state);
            return Ok(state);
        }

        if state.has_staged_update() && state.downloaded_version == release.tag_name {
            tracing::debug!("{} already staged", release.tag_name);
            state.clear_error();
            persist(&store, &mut state);
            return Ok(state);
        }

        if let Err(e) = self.stage_release(&store, &mut state, &release).await {
            return Err(fail(&store, &mut state, e));
        }

        if let Err(e) = self.apply_staged(&store, &mut state) {
            return Err(fail(&store, &mut state, e));
        }

        state.clear_error();
        persist(&store, &mut state);
        Ok(state)
    }

    async fn stage_release(
        &self,
        store: &StateStore,
        state: &mut UpdateState,
        release: &super::checker::Release,
    ) -> Result<()> {
        let asset = select_asset(&release.assets, &self.platform)?;
        let stage_path = store.staging_path(&release.tag_name, &asset.name)?;

        download_asset(
            &self.client,
            &asset.download_url,
            &stage_path,
            self.request_timeout,
        )
        .await?;
        set_executable(&stage_path)?;

        state.downloaded_version = release.tag_name.clone();
        state.downloaded_asset = stage_path.to_string_lossy().into_owned();
        state.apply_pending = true;
        state.clear_error();
        persist(store, state);
        tracing::info!("{} staged at {}", release.tag_name, stage_path.display());
        Ok(())
    }

    /// Swap in a staged download if one is pending.
    fn apply_staged(&self, store: &StateStore, state: &mut UpdateState) -> Result<()> {
        if !state.has_staged_update() {
            return Ok(());
        }

        let source = PathBuf::from(state.downloaded_asset.trim());
        if !source.is_file() {
            tracing::warn!(
                "staged update {} is gone from {}; discarding",
                state.downloaded_version,
                source.display()
            );
            state.downloaded_version.clear();
            state.downloaded_asset.clear();
            state.apply_pending = false;
            persist(store, state);
            return Ok(());
        }

        let request = SwapRequest {
            target: self.executable_path.clone(),
            source,
            cache_dir: self.cache_dir.clone(),
            version: state.downloaded_version.clone(),
        };
        match self.swapper.apply(&request)? {
            SwapOutcome::Replaced => {
                tracing::info!("updated to {}", request.version);
                state.mark_applied(&request.version);
                persist(store, state);
            }
            SwapOutcome::HelperSpawned => {
                tracing::info!("apply of {} handed to helper", request.version);
            }
        }
        Ok(())
    }
}

fn is_blank_path(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

/// Save, logging instead of failing: the cycle's own result matters more
/// than a missed state write.
fn persist(store: &StateStore, state: &mut UpdateState) {
    if let Err(e) = store.save(state) {
        tracing::warn!("cannot persist updater state: {e}");
    }
}

fn fail(store: &StateStore, state: &mut UpdateState, err: CliError) -> CliError {
    state.set_error(&err);
    persist(store, state);
    err
}

/// Start a detached update cycle and return immediately.
///
/// No-op when `config` disables background updates, the options are
/// incomplete, or no tokio runtime is running. The caller cannot observe
/// the outcome except through [`load_state`] later.
pub fn start_background(options: UpdateOptions, config: &UpdaterConfig) {
    if !config.background_enabled() {
        tracing::debug!("background update disabled");
        return;
    }
    let manager = match UpdateManager::new(options) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("background update skipped: {e}");
            return;
        }
    };
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("background update skipped: no async runtime");
        return;
    };

    handle.spawn(async move {
        if let Err(e) = manager.run(false).await {
            tracing::debug!("background update failed: {e}");
        }
    });
}

/// Run a full cycle now, ignoring the cooldown.
///
/// # Errors
///
/// Returns a validation error for incomplete options, otherwise the cycle's
/// error (already recorded in the state file).
pub async fn run_manual(options: UpdateOptions) -> Result<UpdateState> {
    UpdateManager::new(options)?.run(true).await
}

/// Read the persisted state for status reporting.
///
/// # Errors
///
/// Returns an internal error if the state file cannot be read or decoded.
pub fn load_state(cache_dir: impl AsRef<Path>) -> Result<UpdateState> {
    StateStore::new(cache_dir).load()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn env_flag_accepts_truthy_values() {
        for value in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(env_flag_enabled(value), "{value}");
        }
        for value in ["0", "false", "", "no", "off", "2"] {
            assert!(!env_flag_enabled(value), "{value}");
        }
    }

    #[test]
    fn config_resolves_from_lookup() {
        let config = UpdaterConfig::from_lookup(lookup(&[(DISABLE_ENV_VAR, "yes")]));
        assert!(config.disabled);
        assert!(!config.helper_mode);
        assert!(!config.background_enabled());

        let config = UpdaterConfig::from_lookup(lookup(&[(HELPER_ENV_VAR, "1")]));
        assert!(config.helper_mode);
        assert!(!config.background_enabled());

        let config = UpdaterConfig::from_lookup(lookup(&[(DISABLE_ENV_VAR, "0")]));
        assert!(config.background_enabled());
    }

    #[test]
    fn manager_requires_core_options() {
        let err = UpdateManager::new(UpdateOptions::default()).unwrap_err();
        assert!(matches!(err, CliError::Validation(_)));

        let err = UpdateManager::new(UpdateOptions {
            current_version: "v1.0.0".to_owned(),
            executable_path: PathBuf::from("/bin/zerodha"),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Validation(_)));
    }

    #[test]
    fn manager_fills_defaults() {
        let manager = UpdateManager::new(UpdateOptions {
            current_version: " v1.0.0 ".to_owned(),
            executable_path: PathBuf::from("/bin/zerodha"),
            cache_dir: PathBuf::from("/tmp/zerodha-cache"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(manager.current_version, "v1.0.0");
        assert_eq!(manager.repo_owner, DEFAULT_REPO_OWNER);
        assert_eq!(manager.repo_name, DEFAULT_REPO_NAME);
        assert_eq!(manager.cooldown, DEFAULT_COOLDOWN);
        assert_eq!(manager.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(manager.platform, Platform::current());
    }

    #[test]
    fn running_version_parses() {
        assert!(crate::update::version::Version::parse(running_version()).is_ok());
    }

    #[test]
    fn start_background_without_runtime_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        start_background(
            UpdateOptions {
                current_version: "v1.0.0".to_owned(),
                executable_path: dir.path().join("zerodha"),
                cache_dir: dir.path().to_owned(),
                ..Default::default()
            },
            &UpdaterConfig::default(),
        );
        assert!(!dir.path().join("updater").exists());
    }
}
