//! Human-readable summaries of updater state.

use super::state::UpdateState;
use super::version::is_newer;
use serde::Serialize;

const MAX_ERROR_LEN: usize = 140;

/// One-line status for `zerodha version`.
///
/// Priority: staged and pending, never checked, last check failed, update
/// available, up to date.
pub fn summarize_state(current_version: &str, state: &UpdateState) -> String {
    if state.apply_pending && !state.downloaded_version.trim().is_empty() {
        return format!(
            "update: {} downloaded; apply pending",
            state.downloaded_version
        );
    }
    if state.last_checked_at.is_none() {
        return "update: not checked yet".to_owned();
    }
    if !state.last_error.trim().is_empty() {
        return format!(
            "update: last check failed: {}",
            truncate(&state.last_error, MAX_ERROR_LEN)
        );
    }
    let latest = state.latest_version_seen.trim();
    if !latest.is_empty() && is_newer(latest, current_version) {
        return format!("update: {latest} available");
    }
    "update: up to date".to_owned()
}

/// Cut `value` to at most `max` characters, ending in `...` when shortened.
fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_owned();
    }
    if max <= 3 {
        return value.chars().take(max).collect();
    }
    let mut out: String = value.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

/// Outcome category of a manual update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Nothing newer was published.
    UpToDate,
    /// The live executable was replaced.
    Updated,
    /// A download is staged and waits for the swap to complete.
    ApplyPending,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up_to_date"),
            Self::Updated => write!(f, "updated"),
            Self::ApplyPending => write!(f, "apply_pending"),
        }
    }
}

/// Report printed by `zerodha update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Outcome category.
    pub status: UpdateStatus,
    /// Human-readable message.
    pub message: String,
    /// Version that was running when the command started.
    pub current_version: String,
    /// Most recent tag seen on the feed.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latest_version: String,
    /// Version now installed, when an update was applied.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub updated_version: String,
    /// Staged version awaiting the swap.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pending_version: String,
    /// Mirrors the state flag.
    pub apply_pending: bool,
}

impl UpdateReport {
    /// Build the report for a finished manual cycle.
    pub fn from_state(current_version: &str, state: &UpdateState) -> Self {
        let mut report = Self {
            status: UpdateStatus::UpToDate,
            message: format!("already up to date ({current_version})"),
            current_version: current_version.to_owned(),
            latest_version: state.latest_version_seen.trim().to_owned(),
            updated_version: String::new(),
            pending_version: String::new(),
            apply_pending: state.apply_pending,
        };

        let pending = state.downloaded_version.trim();
        if state.apply_pending && !pending.is_empty() {
            report.status = UpdateStatus::ApplyPending;
            report.pending_version = pending.to_owned();
            report.message = format!("update downloaded: {pending} (apply pending)");
            return report;
        }

        let installed = state.current_version.trim();
        if !installed.is_empty() && is_newer(installed, current_version) {
            report.status = UpdateStatus::Updated;
            report.updated_version = installed.to_owned();
            report.message = format!("updated from {current_version} to {installed}");
        }
        report
    }
}
