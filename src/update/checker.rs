//! GitHub release checker.
//!
//! Queries the releases API for the latest published tag and picks the raw
//! binary asset that matches the running platform.

use crate::error::{CliError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default GitHub API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// User-Agent sent with every updater request.
pub const USER_AGENT: &str = "zerodha-kite-cli-updater";

/// A published release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Tag name (e.g. "v0.4.1").
    pub tag_name: String,
    /// Downloadable assets attached to the release.
    pub assets: Vec<ReleaseAsset>,
}

/// A single downloadable release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// Asset filename (e.g. "zerodha_linux_amd64").
    pub name: String,
    /// Direct download URL.
    pub download_url: String,
    /// Size in bytes as reported by the feed.
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    #[serde(default)]
    name: String,
    #[serde(default)]
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

/// Target platform expressed in release-asset naming (`darwin`, `amd64`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system token.
    pub os: String,
    /// Architecture token.
    pub arch: String,
}

impl Platform {
    /// Create a platform from explicit tokens.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "powerpc64" => "ppc64",
            "s390x" => "s390x",
            "riscv64" => "riscv64",
            other => other,
        };
        Self::new(os, arch)
    }
}

/// Fetch the latest release for `owner/repo`.
///
/// An empty `api_base_url` falls back to [`DEFAULT_API_BASE_URL`].
///
/// # Errors
///
/// - [`CliError::Network`] on transport failure or timeout
/// - [`CliError::Api`] on a non-200 status or an undecodable body
/// - [`CliError::Validation`] if the release has no tag name
pub async fn fetch_latest_release(
    client: &reqwest::Client,
    api_base_url: &str,
    owner: &str,
    repo: &str,
    timeout: Duration,
) -> Result<Release> {
    let base = match api_base_url.trim() {
        "" => DEFAULT_API_BASE_URL,
        other => other,
    };
    let url = format!(
        "{}/repos/{owner}/{repo}/releases/latest",
        base.trim_end_matches('/')
    );

    tracing::debug!("checking latest release at {url}");
    let resp = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| CliError::from_http("request latest release", e))?;

    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        return Err(CliError::Api(format!(
            "latest release request returned status {}",
            status.as_u16()
        )));
    }

    let body: GitHubRelease = resp
        .json()
        .await
        .map_err(|e| CliError::from_http("decode latest release", e))?;

    let release = Release {
        tag_name: body.tag_name.trim().to_owned(),
        assets: body
            .assets
            .into_iter()
            .map(|a| ReleaseAsset {
                name: a.name.trim().to_owned(),
                download_url: a.browser_download_url.trim().to_owned(),
                size: a.size,
            })
            .collect(),
    };

    if release.tag_name.is_empty() {
        return Err(CliError::Validation("latest release did not include tag_name".to_owned()));
    }
    Ok(release)
}

/// Pick the raw executable asset for `platform`.
///
/// Candidates must mention both the OS and architecture tokens, must not be
/// archives or checksum files, and must carry `.exe` exactly when targeting
/// Windows. The shortest remaining name wins.
///
/// # Errors
///
/// Returns [`CliError::Validation`] for blank platform tokens and
/// [`CliError::NotFound`] when nothing matches.
pub fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    platform: &Platform,
) -> Result<&'a ReleaseAsset> {
    let os = platform.os.trim().to_lowercase();
    let arch = platform.arch.trim().to_lowercase();
    if os.is_empty() || arch.is_empty() {
        return Err(CliError::Validation("target os and arch are required".to_owned()));
    }

    let windows = os == "windows";
    let mut best: Option<&ReleaseAsset> = None;
    for asset in assets {
        let name = asset.name.trim().to_lowercase();
        if name.is_empty() || asset.download_url.trim().is_empty() {
            continue;
        }
        if !name.contains(&os) || !name.contains(&arch) {
            continue;
        }
        if is_archive_or_checksum(&name) {
            continue;
        }
        if name.ends_with(".exe") != windows {
            continue;
        }
        if best.is_none_or(|b| asset.name.len() < b.name.len()) {
            best = Some(asset);
        }
    }

    best.ok_or_else(|| CliError::NotFound(format!("no release asset matched {os}/{arch}")))
}

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".zip", ".tar", ".tar.gz", ".tgz", ".gz", ".bz2", ".xz", ".sha256", ".sha512", ".txt",
];

fn is_archive_or_checksum(name: &str) -> bool {
    if ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return true;
    }
    let base = name.rsplit('/').next().unwrap_or(name);
    base.contains("checksum") || base.contains("sha256")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_owned(),
            download_url: format!("https://example.com/{name}"),
            size: 0,
        }
    }

    fn published() -> Vec<ReleaseAsset> {
        vec![
            asset("checksums.txt"),
            asset("zerodha_darwin_arm64"),
            asset("zerodha_linux_amd64.tar.gz"),
            asset("zerodha_windows_amd64.exe"),
        ]
    }

    #[test]
    fn selects_raw_darwin_binary() {
        let assets = published();
        let chosen = select_asset(&assets, &Platform::new("darwin", "arm64")).unwrap();
        assert_eq!(chosen.name, "zerodha_darwin_arm64");
    }

    #[test]
    fn selects_windows_exe() {
        let assets = published();
        let chosen = select_asset(&assets, &Platform::new("windows", "amd64")).unwrap();
        assert_eq!(chosen.name, "zerodha_windows_amd64.exe");
    }

    #[test]
    fn archive_only_is_not_found() {
        let assets = vec![asset("zerodha_linux_amd64.tar.gz")];
        let err = select_asset(&assets, &Platform::new("linux", "amd64")).unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)), "got {err:?}");
    }

    #[test]
    fn shortest_name_wins() {
        let assets = vec![
            asset("zerodha_linux_amd64_debug"),
            asset("zerodha_linux_amd64"),
            asset("zerodha_linux_amd64_v2"),
        ];
        let chosen = select_asset(&assets, &Platform::new("linux", "amd64")).unwrap();
        assert_eq!(chosen.name, "zerodha_linux_amd64");
    }

    #[test]
    fn exe_rejected_off_windows() {
        let assets = vec![asset("zerodha_linux_amd64.exe")];
        assert!(select_asset(&assets, &Platform::new("linux", "amd64")).is_err());
    }

    #[test]
    fn checksum_names_and_blank_urls_skipped() {
        let mut blank = asset("zerodha_linux_amd64");
        blank.download_url = "  ".to_owned();
        let assets = vec![
            asset("zerodha_linux_amd64_sha256"),
            asset("zerodha_linux_amd64.checksum"),
            blank,
        ];
        assert!(select_asset(&assets, &Platform::new("linux", "amd64")).is_err());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let assets = vec![asset("Zerodha_Darwin_ARM64")];
        let chosen = select_asset(&assets, &Platform::new("DARWIN", "arm64")).unwrap();
        assert_eq!(chosen.name, "Zerodha_Darwin_ARM64");
    }

    #[test]
    fn blank_platform_is_validation_error() {
        let err = select_asset(&published(), &Platform::new("", "amd64")).unwrap_err();
        assert!(matches!(err, CliError::Validation(_)));
    }

    #[test]
    fn current_platform_uses_release_tokens() {
        let platform = Platform::current();
        assert!(!platform.os.is_empty());
        assert_ne!(platform.os, "macos");
        assert_ne!(platform.arch, "x86_64");
        assert_ne!(platform.arch, "aarch64");
    }
}
