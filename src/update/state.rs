//! Update state persistence.
//!
//! Tracks the last release check, the most recent failure, and any staged
//! download waiting to replace the live executable. Persisted to
//! `<cache_dir>/updater/state.json` with owner-only permissions.
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so readers never observe a partial document. There is no lock: concurrent
//! invocations resolve as last-write-wins, which is acceptable because checks
//! are idempotent and cooldown-gated.

use crate::atomic_file::{create_private_dir, write_private_atomic};
use crate::error::{CliError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const UPDATER_DIR: &str = "updater";
const DOWNLOADS_DIR: &str = "downloads";
const STATE_FILE: &str = "state.json";

/// Persistent updater state. Empty fields are omitted from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateState {
    /// Version believed to be running after the last successful apply.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_version: String,
    /// When the release feed was last queried (successfully or not).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Most recent tag observed on the release feed.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latest_version_seen: String,
    /// Tag of the staged, not yet applied, download.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub downloaded_version: String,
    /// Filesystem path of the staged download.
    #[serde(
        rename = "downloaded_asset_path",
        skip_serializing_if = "String::is_empty"
    )]
    pub downloaded_asset: String,
    /// A staged download exists and has not replaced the live executable.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub apply_pending: bool,
    /// Message of the most recent failure.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_error: String,
    /// When the most recent failure happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    /// Stamped on every save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UpdateState {
    /// Record a failure.
    pub fn set_error(&mut self, err: &CliError) {
        self.last_error = err.to_string();
        self.last_error_at = Some(Utc::now());
    }

    /// Forget the last failure.
    pub fn clear_error(&mut self) {
        self.last_error.clear();
        self.last_error_at = None;
    }

    /// Returns `true` if a staged download is waiting to be swapped in.
    pub fn has_staged_update(&self) -> bool {
        self.apply_pending && !self.downloaded_asset.trim().is_empty()
    }

    /// Mark the staged download as applied.
    pub fn mark_applied(&mut self, version: &str) {
        self.current_version = version.to_owned();
        self.downloaded_version.clear();
        self.downloaded_asset.clear();
        self.apply_pending = false;
    }

    /// Returns `true` if the last check is older than `cooldown` (or no check
    /// was ever recorded).
    pub fn check_is_stale(&self, now: DateTime<Utc>, cooldown: std::time::Duration) -> bool {
        let Some(last) = self.last_checked_at else {
            return true;
        };
        match (now - last).to_std() {
            Ok(elapsed) => elapsed >= cooldown,
            // Clock went backwards relative to the stored stamp.
            Err(_) => false,
        }
    }
}

/// Reads and writes [`UpdateState`] under a cache directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    base_dir: PathBuf,
    state_path: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `<cache_dir>/updater`.
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        let base_dir = cache_dir.as_ref().join(UPDATER_DIR);
        let state_path = base_dir.join(STATE_FILE);
        Self {
            base_dir,
            state_path,
        }
    }

    /// Path of the state document.
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Load state from disk. A missing or empty file yields the default state.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the file exists but cannot be read or
    /// decoded.
    pub fn load(&self) -> Result<UpdateState> {
        let bytes = match std::fs::read(&self.state_path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UpdateState::default());
            }
            Err(e) => {
                return Err(CliError::Internal(format!("read updater state: {e}")));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(UpdateState::default());
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| CliError::Internal(format!("decode updater state: {e}")))
    }

    /// Persist `state`, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if any step of the temp-write-then-rename
    /// sequence fails. The temp file is removed on failure.
    pub fn save(&self, state: &mut UpdateState) -> Result<()> {
        create_private_dir(&self.base_dir)
            .map_err(|e| CliError::Internal(format!("create updater directory: {e}")))?;

        state.updated_at = Some(Utc::now());
        let mut json = serde_json::to_vec_pretty(state)
            .map_err(|e| CliError::Internal(format!("encode updater state: {e}")))?;
        json.push(b'\n');

        write_private_atomic(&self.base_dir, "state", &self.state_path, &json)
            .map_err(|e| CliError::Internal(format!("write updater state: {e}")))
    }

    /// Deterministic staging location for a downloaded asset:
    /// `<cache_dir>/updater/downloads/<sanitized-version>/<asset-basename>`.
    ///
    /// Creates the version directory.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank asset name and an internal
    /// error if the directory cannot be created.
    pub fn staging_path(&self, version: &str, asset_name: &str) -> Result<PathBuf> {
        let name = asset_name.trim();
        let file_name = Path::new(name)
            .file_name()
            .filter(|_| !name.is_empty())
            .ok_or_else(|| CliError::Validation("asset name is required".to_owned()))?;

        let mut version_dir = sanitize_version(version);
        if version_dir.is_empty() {
            version_dir = "unknown".to_owned();
        }

        let dir = self.base_dir.join(DOWNLOADS_DIR).join(version_dir);
        create_private_dir(&dir)
            .map_err(|e| CliError::Internal(format!("create updater downloads directory: {e}")))?;
        Ok(dir.join(file_name))
    }
}

/// Strip a leading `v`/`V` and replace anything outside `[A-Za-z0-9._-]`
/// with `_`, so an untrusted tag cannot escape the downloads directory.
pub fn sanitize_version(version: &str) -> String {
    let v = version.trim();
    let v = v
        .strip_prefix('v')
        .or_else(|| v.strip_prefix('V'))
        .unwrap_or(v);
    v.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn full_state() -> UpdateState {
        UpdateState {
            current_version: "v0.3.0".to_owned(),
            last_checked_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()),
            latest_version_seen: "v0.4.0".to_owned(),
            downloaded_version: "v0.4.0".to_owned(),
            downloaded_asset: "/tmp/zerodha_linux_amd64".to_owned(),
            apply_pending: true,
            last_error: "boom".to_owned(),
            last_error_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap()),
            updated_at: None,
        }
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateStore::new(dir.path()).load().unwrap();
        assert_eq!(state, UpdateState::default());
    }

    #[test]
    fn load_empty_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::create_dir_all(store.state_path().parent().unwrap()).unwrap();
        std::fs::write(store.state_path(), "").unwrap();
        assert_eq!(store.load().unwrap(), UpdateState::default());
    }

    #[test]
    fn load_corrupt_file_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::create_dir_all(store.state_path().parent().unwrap()).unwrap();
        std::fs::write(store.state_path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(CliError::Internal(_))));
    }

    #[test]
    fn save_then_load_round_trips_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut state = full_state();
        store.save(&mut state).unwrap();
        assert!(state.updated_at.is_some());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_then_load_round_trips_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut state = UpdateState::default();
        store.save(&mut state).unwrap();

        let raw = std::fs::read_to_string(store.state_path()).unwrap();
        assert!(!raw.contains("apply_pending"));
        assert!(!raw.contains("last_error"));
        assert!(raw.contains("updated_at"));
        assert!(raw.ends_with('\n'));

        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn document_uses_asset_path_key() {
        let json = serde_json::to_string(&full_state()).unwrap();
        assert!(json.contains("\"downloaded_asset_path\""));
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&mut full_state()).unwrap();
        store.save(&mut full_state()).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("updater"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["state.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn state_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&mut UpdateState::default()).unwrap();
        let mode = std::fs::metadata(store.state_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn staging_path_is_sanitized_and_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let path = store
            .staging_path("v1.2.3-rc.1/../../x", "nested/zerodha_linux_amd64")
            .unwrap();

        let expected_dir = dir
            .path()
            .join("updater")
            .join("downloads")
            .join("1.2.3-rc.1_.._.._x");
        assert_eq!(path, expected_dir.join("zerodha_linux_amd64"));
        assert!(expected_dir.is_dir());
    }

    #[test]
    fn staging_path_falls_back_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let path = store.staging_path("v", "zerodha").unwrap();
        assert!(path.parent().unwrap().ends_with("unknown"));
    }

    #[test]
    fn staging_path_requires_asset_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(matches!(
            store.staging_path("v1.0.0", "   "),
            Err(CliError::Validation(_))
        ));
    }

    #[test]
    fn sanitize_version_examples() {
        assert_eq!(sanitize_version(" v1.2.3 "), "1.2.3");
        assert_eq!(sanitize_version("V2.0.0+build"), "2.0.0_build");
        assert_eq!(sanitize_version("a b:c"), "a_b_c");
    }

    #[test]
    fn error_set_and_clear() {
        let mut state = UpdateState::default();
        state.set_error(&CliError::Network("timeout".to_owned()));
        assert!(state.last_error.contains("timeout"));
        assert!(state.last_error_at.is_some());
        state.clear_error();
        assert!(state.last_error.is_empty());
        assert!(state.last_error_at.is_none());
    }

    #[test]
    fn mark_applied_clears_staging() {
        let mut state = full_state();
        assert!(state.has_staged_update());
        state.mark_applied("v0.4.0");
        assert_eq!(state.current_version, "v0.4.0");
        assert!(!state.apply_pending);
        assert!(state.downloaded_version.is_empty());
        assert!(state.downloaded_asset.is_empty());
        assert!(!state.has_staged_update());
    }

    #[test]
    fn check_is_stale_honors_cooldown() {
        let now = Utc::now();
        let mut state = UpdateState::default();
        assert!(state.check_is_stale(now, Duration::from_secs(3600)));

        state.last_checked_at = Some(now - chrono::Duration::minutes(5));
        assert!(!state.check_is_stale(now, Duration::from_secs(3600)));
        assert!(state.check_is_stale(now, Duration::from_secs(60)));
    }
}
