//! Command bodies shared by the `zerodha` binary.
//!
//! Argument parsing lives in the binary; everything here takes already
//! resolved paths and a [`Printer`] so it can run against temp directories.

use crate::config::{ConfigStore, validate_profile_name};
use crate::error::{CliError, Result};
use crate::output::Printer;
use crate::update::{
    RetryPolicy, SwapRequest, UpdateOptions, UpdateReport, UpdaterConfig, load_state,
    run_manual, start_background, summarize_state,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Top-level command families, as far as the updater cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Version,
    Update,
    Config,
    SelfUpdateApply,
}

impl CommandKind {
    /// Whether the cooldown-gated background check runs alongside the
    /// command. `update` runs its own forced cycle, and the helper must
    /// never start one.
    pub fn starts_background_update(self) -> bool {
        matches!(self, Self::Version | Self::Config)
    }
}

/// Start the background check for `kind` if it wants one. Failures to
/// resolve the options are only logged.
pub fn start_background_update(
    kind: CommandKind,
    options: Result<UpdateOptions>,
    updater: &UpdaterConfig,
) {
    if !kind.starts_background_update() {
        return;
    }
    match options {
        Ok(options) => start_background(options, updater),
        Err(e) => tracing::debug!("background update skipped: {e}"),
    }
}

#[derive(Serialize)]
struct VersionInfo<'a> {
    version: &'a str,
    update: String,
}

/// `zerodha version`: the running version plus a one-line update summary.
///
/// A cache directory that cannot be resolved, or a state file that cannot
/// be read, is reported as `update: unavailable (...)` rather than failing.
pub fn version<W: Write>(
    printer: &mut Printer<W>,
    current_version: &str,
    cache_dir: Result<PathBuf>,
) -> Result<()> {
    let update = match cache_dir.and_then(load_state) {
        Ok(state) => summarize_state(current_version, &state),
        Err(e) => format!("update: unavailable ({e})"),
    };

    if printer.is_json() {
        return printer.json(&VersionInfo {
            version: current_version,
            update,
        });
    }
    printer.line(format_args!("zerodha {current_version}"))?;
    printer.line(update)
}

/// `zerodha update`: force a check and report what happened.
pub async fn update<W: Write>(printer: &mut Printer<W>, options: UpdateOptions) -> Result<()> {
    let current = options.current_version.trim().to_owned();
    let state = run_manual(options).await?;
    let report = UpdateReport::from_state(&current, &state);

    if printer.is_json() {
        return printer.json(&report);
    }

    let mut pairs = vec![
        ("status", report.status.to_string()),
        ("message", report.message.clone()),
        ("current_version", report.current_version.clone()),
    ];
    for (key, value) in [
        ("latest_version", &report.latest_version),
        ("updated_version", &report.updated_version),
        ("pending_version", &report.pending_version),
    ] {
        if !value.is_empty() {
            pairs.push((key, value.clone()));
        }
    }
    pairs.push(("apply_pending", report.apply_pending.to_string()));
    printer.kv(&pairs)
}

/// `zerodha __self-update-apply`: the detached helper's entry point.
pub fn self_update_apply(request: &SwapRequest) -> Result<()> {
    crate::update::applier::run_apply_helper(request, &RetryPolicy::default())
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CliError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

#[derive(Serialize)]
struct ProfileChange<'a> {
    profile: &'a str,
    active_profile: &'a str,
    path: &'a Path,
}

fn report_change<W: Write>(
    printer: &mut Printer<W>,
    store: &ConfigStore,
    profile: &str,
    active_profile: &str,
    message: &str,
) -> Result<()> {
    if printer.is_json() {
        return printer.json(&ProfileChange {
            profile,
            active_profile,
            path: store.path(),
        });
    }
    printer.line(message)
}

/// `zerodha config profile add`.
pub fn profile_add<W: Write>(
    printer: &mut Printer<W>,
    store: &ConfigStore,
    name: &str,
    api_key: &str,
    api_secret: &str,
    set_active: bool,
) -> Result<()> {
    let name = validate_profile_name(name)?;
    let api_key = required("api key", api_key)?;
    let api_secret = required("api secret", api_secret)?;

    let mut cfg = store.load()?;
    cfg.upsert_credentials(name, api_key, api_secret, set_active);
    store.save(&cfg)?;

    report_change(
        printer,
        store,
        name,
        &cfg.active_profile,
        &format!("saved profile {name:?} to {}", store.path().display()),
    )
}

/// `zerodha config profile set-api-key`.
pub fn profile_set_api_key<W: Write>(
    printer: &mut Printer<W>,
    store: &ConfigStore,
    name: &str,
    api_key: &str,
) -> Result<()> {
    let name = validate_profile_name(name)?;
    let api_key = required("api key", api_key)?;

    let mut cfg = store.load()?;
    cfg.update_profile(name, |p| p.api_key = api_key.to_owned())?;
    store.save(&cfg)?;

    report_change(
        printer,
        store,
        name,
        &cfg.active_profile,
        &format!("updated api key for profile {name:?}"),
    )
}

/// `zerodha config profile set-api-secret`.
pub fn profile_set_api_secret<W: Write>(
    printer: &mut Printer<W>,
    store: &ConfigStore,
    name: &str,
    api_secret: &str,
) -> Result<()> {
    let name = validate_profile_name(name)?;
    let api_secret = required("api secret", api_secret)?;

    let mut cfg = store.load()?;
    cfg.update_profile(name, |p| p.api_secret = api_secret.to_owned())?;
    store.save(&cfg)?;

    report_change(
        printer,
        store,
        name,
        &cfg.active_profile,
        &format!("updated api secret for profile {name:?}"),
    )
}

/// `zerodha config profile use`.
pub fn profile_use<W: Write>(
    printer: &mut Printer<W>,
    store: &ConfigStore,
    name: &str,
) -> Result<()> {
    let name = validate_profile_name(name)?;

    let mut cfg = store.load()?;
    cfg.set_active(name)?;
    store.save(&cfg)?;

    report_change(
        printer,
        store,
        name,
        &cfg.active_profile,
        &format!("active profile set to {name:?}"),
    )
}

/// `zerodha config profile remove`.
pub fn profile_remove<W: Write>(
    printer: &mut Printer<W>,
    store: &ConfigStore,
    name: &str,
) -> Result<()> {
    let name = validate_profile_name(name)?;

    let mut cfg = store.load()?;
    cfg.remove_profile(name)?;
    store.save(&cfg)?;

    report_change(
        printer,
        store,
        name,
        &cfg.active_profile,
        &format!("removed profile {name:?}"),
    )
}

#[derive(Serialize)]
struct ProfileRow<'a> {
    name: &'a str,
    active: bool,
    api_key: &'a str,
    has_access_token: bool,
}

/// `zerodha config profile list`.
pub fn profile_list<W: Write>(printer: &mut Printer<W>, store: &ConfigStore) -> Result<()> {
    let cfg = store.load()?;
    let rows: Vec<ProfileRow<'_>> = cfg
        .profiles
        .iter()
        .map(|(name, p)| ProfileRow {
            name,
            active: *name == cfg.active_profile,
            api_key: &p.api_key,
            has_access_token: !p.access_token.is_empty(),
        })
        .collect();

    if printer.is_json() {
        return printer.json(&rows);
    }
    if rows.is_empty() {
        return printer.line("no profiles configured; add one with `zerodha config profile add`");
    }
    printer.table(
        ["PROFILE", "ACTIVE", "API KEY", "SESSION"],
        rows.iter().map(|r| {
            vec![
                r.name.to_owned(),
                if r.active { "*".to_owned() } else { String::new() },
                r.api_key.to_owned(),
                if r.has_access_token { "yes" } else { "no" }.to_owned(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::update::{StateStore, UpdateState};

    fn text(printer: Printer<Vec<u8>>) -> String {
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn only_passive_commands_start_background_update() {
        assert!(CommandKind::Version.starts_background_update());
        assert!(CommandKind::Config.starts_background_update());
        assert!(!CommandKind::Update.starts_background_update());
        assert!(!CommandKind::SelfUpdateApply.starts_background_update());
    }

    #[test]
    fn version_prints_summary_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = Printer::new(false, Vec::new());
        version(&mut p, "v1.0.0", Ok(dir.path().to_path_buf())).unwrap();
        assert_eq!(text(p), "zerodha v1.0.0\nupdate: not checked yet\n");
    }

    #[test]
    fn version_reports_pending_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = UpdateState {
            downloaded_version: "v1.1.0".to_owned(),
            apply_pending: true,
            ..Default::default()
        };
        StateStore::new(dir.path()).save(&mut state).unwrap();

        let mut p = Printer::new(true, Vec::new());
        version(&mut p, "v1.0.0", Ok(dir.path().to_path_buf())).unwrap();
        let out: serde_json::Value = serde_json::from_slice(&p.into_inner()).unwrap();
        assert_eq!(out["version"], "v1.0.0");
        assert_eq!(out["update"], "update: v1.1.0 downloaded; apply pending");
    }

    #[test]
    fn version_tolerates_unreadable_state() {
        let mut p = Printer::new(false, Vec::new());
        version(
            &mut p,
            "v1.0.0",
            Err(CliError::Internal("no cache".to_owned())),
        )
        .unwrap();
        assert!(text(p).contains("update: unavailable (internal error: no cache)"));
    }

    #[test]
    fn profile_commands_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut p = Printer::new(false, Vec::new());

        profile_add(&mut p, &store, "main", "key1", "secret1", false).unwrap();
        profile_add(&mut p, &store, "alt", "key2", "secret2", false).unwrap();
        profile_set_api_key(&mut p, &store, "alt", "key3").unwrap();
        profile_use(&mut p, &store, "alt").unwrap();

        let cfg = store.load().unwrap();
        assert_eq!(cfg.active_profile, "alt");
        assert_eq!(cfg.profiles["alt"].api_key, "key3");
        assert_eq!(cfg.profiles["main"].api_secret, "secret1");

        profile_remove(&mut p, &store, "alt").unwrap();
        assert_eq!(store.load().unwrap().active_profile, "main");
    }

    #[test]
    fn profile_add_rejects_blank_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut p = Printer::new(false, Vec::new());

        let err = profile_add(&mut p, &store, " ", "k", "s", false).unwrap_err();
        assert_eq!(err.exit_code(), 10);
        let err = profile_add(&mut p, &store, "main", "k", "  ", false).unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn editing_missing_profile_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut p = Printer::new(false, Vec::new());

        let err = profile_set_api_secret(&mut p, &store, "ghost", "s").unwrap_err();
        assert_eq!(err.exit_code(), 11);
        let err = profile_use(&mut p, &store, "ghost").unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn empty_profile_list_prints_hint() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut p = Printer::new(false, Vec::new());
        profile_list(&mut p, &store).unwrap();
        assert!(text(p).starts_with("no profiles configured"));
    }

    #[test]
    fn profile_list_json_marks_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let mut p = Printer::new(false, Vec::new());
        profile_add(&mut p, &store, "main", "key1", "secret1", false).unwrap();
        profile_add(&mut p, &store, "alt", "key2", "secret2", false).unwrap();

        let mut p = Printer::new(true, Vec::new());
        profile_list(&mut p, &store).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&p.into_inner()).unwrap();
        assert_eq!(rows[0]["name"], "alt");
        assert_eq!(rows[0]["active"], false);
        assert_eq!(rows[1]["name"], "main");
        assert_eq!(rows[1]["active"], true);
        assert!(rows[1].get("api_secret").is_none());
    }

    #[test]
    fn helper_rejects_incomplete_request() {
        let request = SwapRequest {
            target: PathBuf::new(),
            source: PathBuf::from("/tmp/staged"),
            cache_dir: PathBuf::from("/tmp/cache"),
            version: "v1.0.0".to_owned(),
        };
        let err = self_update_apply(&request).unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }
}
