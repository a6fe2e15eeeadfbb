//! Release asset download into the staging area.
//!
//! The body is streamed into `<destination>.tmp` and only renamed onto the
//! final staging path once fully written, so an interrupted download never
//! leaves a truncated binary where the swap executor would pick it up.

use super::checker::USER_AGENT;
use crate::atomic_file::create_private_dir;
use crate::error::{CliError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Download `url` to `destination`.
///
/// # Errors
///
/// - [`CliError::Network`] on transport failure, timeout, or a broken body
/// - [`CliError::Api`] on a non-200 status
/// - [`CliError::Internal`] on filesystem failures
pub async fn download_asset(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    timeout: Duration,
) -> Result<()> {
    tracing::info!("downloading update from {url}");
    let mut resp = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| CliError::from_http("download release asset", e))?;

    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        return Err(CliError::Api(format!(
            "download release asset returned status {}",
            status.as_u16()
        )));
    }

    if let Some(parent) = destination.parent() {
        create_private_dir(parent)
            .map_err(|e| CliError::Internal(format!("create download directory: {e}")))?;
    }

    let tmp_path = temp_download_path(destination);
    let mut file = open_download_file(&tmp_path)
        .map_err(|e| CliError::Internal(format!("create temporary download file: {e}")))?;

    let written = async {
        let mut total: u64 = 0;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| CliError::Network(format!("read downloaded asset: {e}")))?
        {
            file.write_all(&chunk)
                .map_err(|e| CliError::Internal(format!("write downloaded asset: {e}")))?;
            total += chunk.len() as u64;
        }
        file.sync_all()
            .map_err(|e| CliError::Internal(format!("close downloaded asset: {e}")))?;
        Ok::<u64, CliError>(total)
    }
    .await;
    drop(file);

    let total = match written {
        Ok(total) => total,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    if let Err(e) = std::fs::rename(&tmp_path, destination) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(CliError::Internal(format!("finalize downloaded asset: {e}")));
    }

    tracing::info!("staged {total} bytes at {}", destination.display());
    Ok(())
}

fn temp_download_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn open_download_file(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o700);
    }
    options.open(path)
}

/// Mark `path` as executable (0755) on Unix platforms.
///
/// # Errors
///
/// Returns an internal error if the permissions cannot be changed.
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            CliError::Internal(format!(
                "cannot set executable permission on {}: {e}",
                path.display()
            ))
        })?;
    }
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn temp_path_appends_suffix() {
        let tmp = temp_download_path(Path::new("/cache/updater/downloads/1.0.0/zerodha"));
        assert_eq!(
            tmp,
            PathBuf::from("/cache/updater/downloads/1.0.0/zerodha.tmp")
        );
    }

    #[test]
    fn set_executable_succeeds_on_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test-binary");
        std::fs::write(&file, "#!/bin/sh\necho ok").unwrap();

        set_executable(&file).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::metadata(&file).unwrap().permissions();
            assert_eq!(perms.mode() & 0o777, 0o755);
        }
    }

    #[test]
    fn set_executable_rejects_missing_file() {
        if cfg!(unix) {
            assert!(set_executable(Path::new("/nonexistent/zerodha-test-binary")).is_err());
        }
    }
}
