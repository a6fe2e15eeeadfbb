//! Platform-specific replacement of the running executable.
//!
//! - **Linux/macOS**: the live binary is renamed to `<path>.old`, the staged
//!   file is moved into place (byte copy when a rename cannot cross
//!   filesystems), and the backup is restored if anything fails after the
//!   first rename.
//! - **Windows**: a running image cannot be replaced in-process, so a
//!   detached copy of the executable is launched with the hidden
//!   [`HELPER_COMMAND`] subcommand. It retries the rename sequence until the
//!   original process releases the file and records the outcome in the state
//!   store itself.

use super::download::set_executable;
use super::state::StateStore;
use crate::error::{CliError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hidden subcommand name used for the out-of-process swap.
pub const HELPER_COMMAND: &str = "__self-update-apply";

/// Environment marker set on the helper process so it does not start its
/// own update cycle.
pub const HELPER_ENV_VAR: &str = "ZERODHA_AUTO_UPDATE_HELPER";

/// Everything needed to swap a staged binary into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    /// Live executable to replace.
    pub target: PathBuf,
    /// Staged download.
    pub source: PathBuf,
    /// Cache directory holding the updater state.
    pub cache_dir: PathBuf,
    /// Version being installed.
    pub version: String,
}

impl SwapRequest {
    fn validate(&self) -> Result<()> {
        let blank = |p: &Path| p.as_os_str().to_string_lossy().trim().is_empty();
        if blank(&self.target) || blank(&self.source) || blank(&self.cache_dir) {
            return Err(CliError::Validation(
                "target, source, and cache-dir are required".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Bounded retry window for the helper's rename loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of swap attempts.
    pub attempts: u32,
    /// Pause between attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 300,
            interval: Duration::from_millis(100),
        }
    }
}

/// What a swap attempt achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The live executable now holds the staged binary.
    Replaced,
    /// A helper process was launched and will finish the swap.
    HelperSpawned,
}

/// Strategy for replacing the live executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinarySwapper {
    /// Rename-based replacement inside the current process.
    InPlace,
    /// Delegate to a detached helper invocation of `executable`.
    Helper {
        /// Binary to launch as the helper.
        executable: PathBuf,
    },
}

impl BinarySwapper {
    /// Pick the strategy for the platform this binary was built for.
    pub fn for_current_platform(executable: &Path) -> Self {
        if cfg!(target_os = "windows") {
            Self::Helper {
                executable: executable.to_owned(),
            }
        } else {
            Self::InPlace
        }
    }

    /// Apply `request` using this strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-place swap fails (after restoring the
    /// original executable) or the helper cannot be launched.
    pub fn apply(&self, request: &SwapRequest) -> Result<SwapOutcome> {
        match self {
            Self::InPlace => {
                replace_in_place(&request.target, &request.source)?;
                Ok(SwapOutcome::Replaced)
            }
            Self::Helper { executable } => {
                spawn_apply_helper(executable, request)?;
                Ok(SwapOutcome::HelperSpawned)
            }
        }
    }
}

/// Path of the backup kept while a swap is in flight.
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

/// Replace `target` with `source` via rename, falling back to a byte copy.
///
/// # Errors
///
/// Returns an internal error if the swap fails. The original executable is
/// back at `target` whenever an error is returned after the backup rename.
pub fn replace_in_place(target: &Path, source: &Path) -> Result<()> {
    swap_with(target, source, |from, to| std::fs::rename(from, to))
}

fn swap_with(
    target: &Path,
    source: &Path,
    rename: impl Fn(&Path, &Path) -> std::io::Result<()>,
) -> Result<()> {
    let backup = backup_path(target);
    let _ = std::fs::remove_file(&backup);

    rename(target, &backup).map_err(|e| {
        CliError::Internal(format!(
            "move current binary {} to backup: {e}",
            target.display()
        ))
    })?;

    if let Err(rename_err) = rename(source, target) {
        tracing::debug!("rename of staged binary failed ({rename_err}), falling back to copy");
        if let Err(copy_err) = copy_executable(source, target) {
            restore_backup(&backup, target);
            return Err(CliError::Internal(format!(
                "move downloaded binary into place: {rename_err} (copy fallback: {copy_err})"
            )));
        }
        let _ = std::fs::remove_file(source);
    }

    if let Err(e) = set_executable(target) {
        restore_backup(&backup, target);
        return Err(e);
    }

    let _ = std::fs::remove_file(&backup);
    tracing::info!("binary updated at {}", target.display());
    Ok(())
}

fn restore_backup(backup: &Path, target: &Path) {
    if let Err(e) = std::fs::rename(backup, target) {
        tracing::warn!(
            "cannot restore {} from {}: {e}",
            target.display(),
            backup.display()
        );
    }
}

fn copy_executable(source: &Path, target: &Path) -> std::io::Result<()> {
    let mut input = std::fs::File::open(source)?;
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o755);
    }
    let mut output = options.open(target)?;
    std::io::copy(&mut input, &mut output)?;
    output.sync_all()
}

/// Launch a detached helper that finishes the swap once this process lets
/// go of the executable.
///
/// # Errors
///
/// Returns a validation error for an incomplete request and an internal
/// error if the process cannot be started.
pub fn spawn_apply_helper(executable: &Path, request: &SwapRequest) -> Result<()> {
    if executable.as_os_str().is_empty() {
        return Err(CliError::Validation("executable path is required".to_owned()));
    }
    request.validate()?;

    let mut command = std::process::Command::new(executable);
    command
        .arg(HELPER_COMMAND)
        .arg("--target")
        .arg(&request.target)
        .arg("--source")
        .arg(&request.source)
        .arg("--cache-dir")
        .arg(&request.cache_dir)
        .arg("--version")
        .arg(&request.version)
        .env(HELPER_ENV_VAR, "1")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = command
        .spawn()
        .map_err(|e| CliError::Internal(format!("start apply helper: {e}")))?;
    tracing::info!(
        "apply helper started (pid {}) for {}",
        child.id(),
        request.target.display()
    );
    Ok(())
}

/// Body of the hidden helper subcommand: retry the rename sequence within
/// `policy`, then record the outcome in the state store.
///
/// # Errors
///
/// Returns a validation error for an incomplete request, or an internal
/// error once every attempt has failed.
pub fn run_apply_helper(request: &SwapRequest, policy: &RetryPolicy) -> Result<()> {
    request.validate()?;

    let backup = backup_path(&request.target);
    let mut last_err: Option<std::io::Error> = None;

    for attempt in 1..=policy.attempts.max(1) {
        let _ = std::fs::remove_file(&backup);
        if let Err(e) = std::fs::rename(&request.target, &backup) {
            tracing::debug!("helper attempt {attempt}: target still busy: {e}");
            last_err = Some(e);
            std::thread::sleep(policy.interval);
            continue;
        }

        if let Err(e) = std::fs::rename(&request.source, &request.target) {
            tracing::debug!("helper attempt {attempt}: cannot move staged binary: {e}");
            last_err = Some(e);
            let _ = std::fs::rename(&backup, &request.target);
            std::thread::sleep(policy.interval);
            continue;
        }

        let _ = set_executable(&request.target);
        let _ = std::fs::remove_file(&backup);
        record_helper_success(&request.cache_dir, &request.version);
        tracing::info!("helper replaced {} after {attempt} attempt(s)", request.target.display());
        return Ok(());
    }

    let cause = match last_err {
        Some(e) => e.to_string(),
        None => "failed to replace executable".to_owned(),
    };
    let err = CliError::Internal(format!("apply staged update: {cause}"));
    record_helper_failure(&request.cache_dir, &err);
    Err(err)
}

fn record_helper_success(cache_dir: &Path, version: &str) {
    let store = StateStore::new(cache_dir);
    let mut state = match store.load() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("helper cannot load updater state: {e}");
            return;
        }
    };
    state.mark_applied(version);
    state.clear_error();
    if let Err(e) = store.save(&mut state) {
        tracing::warn!("helper cannot save updater state: {e}");
    }
}

fn record_helper_failure(cache_dir: &Path, err: &CliError) {
    let store = StateStore::new(cache_dir);
    let mut state = match store.load() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("helper cannot load updater state: {e}");
            return;
        }
    };
    state.set_error(err);
    if let Err(e) = store.save(&mut state) {
        tracing::warn!("helper cannot save updater state: {e}");
    }
}
