//! Semantic version parsing and ordering for release tags.
//!
//! Accepts `major.minor.patch[-pre.release][+build]` with an optional `v`/`V`
//! prefix. Build metadata is dropped. Numeric core components must not carry
//! leading zeros; anything malformed is a parse error rather than a guess.

use crate::error::{CliError, Result};
use std::cmp::Ordering;

/// A parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Vec<String>,
}

impl Version {
    /// Parse a version string such as `v1.2.3-rc.1+build.5`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty input, a core that does not have
    /// exactly three numeric components, or components with leading zeros.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || CliError::Validation(format!("invalid semantic version {raw:?}"));

        let mut value = raw.trim();
        if value.is_empty() {
            return Err(invalid());
        }
        value = value
            .strip_prefix('v')
            .or_else(|| value.strip_prefix('V'))
            .unwrap_or(value);

        if let Some((before_build, _)) = value.split_once('+') {
            value = before_build;
        }

        let (core, pre) = match value.split_once('-') {
            Some((core, pre)) if !pre.trim().is_empty() => {
                (core, pre.split('.').map(str::to_owned).collect())
            }
            Some((core, _)) => (core, Vec::new()),
            None => (value, Vec::new()),
        };

        let parts: Vec<&str> = core.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(invalid());
        };

        Ok(Self {
            major: parse_numeric(major).ok_or_else(invalid)?,
            minor: parse_numeric(minor).ok_or_else(invalid)?,
            patch: parse_numeric(patch).ok_or_else(invalid)?,
            pre,
        })
    }
}

fn parse_numeric(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| compare_prerelease(&self.pre, &other.pre))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::str::FromStr for Version {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre.join("."))?;
        }
        Ok(())
    }
}

/// A release sorts after any pre-release of the same core version.
fn compare_prerelease(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    for (x, y) in a.iter().zip(b) {
        if x == y {
            continue;
        }
        return compare_identifier(x, y);
    }
    a.len().cmp(&b.len())
}

/// Numeric identifiers compare numerically and sort before alphanumeric ones.
fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Compare two version strings.
///
/// # Errors
///
/// Returns a validation error if either side fails to parse.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// Returns `true` only when `latest` parses and is strictly newer than
/// `current`. Parse failures on either side yield `false`.
pub fn is_newer(latest: &str, current: &str) -> bool {
    matches!(compare_versions(latest, current), Ok(Ordering::Greater))
}
