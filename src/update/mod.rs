//! Self-update system for the zerodha CLI.
//!
//! Checks GitHub releases for newer versions, stages the platform binary in
//! the cache directory, and swaps it over the running executable (directly on
//! Linux/macOS, through a helper process on Windows). Runs in the background
//! on every command with a cooldown, or on demand via `zerodha update`.

pub mod applier;
pub mod checker;
pub mod download;
pub mod manager;
pub mod state;
pub mod status;
pub mod version;

pub use applier::{BinarySwapper, HELPER_COMMAND, HELPER_ENV_VAR, RetryPolicy, SwapRequest};
pub use checker::{Platform, Release, ReleaseAsset};
pub use manager::{
    UpdateManager, UpdateOptions, UpdaterConfig, load_state, run_manual, running_version,
    start_background,
};
pub use state::{StateStore, UpdateState};
pub use status::{UpdateReport, UpdateStatus, summarize_state};
pub use version::{Version, compare_versions, is_newer};
