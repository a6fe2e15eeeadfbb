//! Owner-only, crash-safe file writes shared by the config and updater stores.
//!
//! Contents go to a uniquely named temp file next to the target, are flushed,
//! and then renamed over the target, so a reader sees either the old or the
//! new document and never a partial one.

use std::io::Write;
use std::path::Path;

/// `mkdir -p` with 0700 on created directories (Unix).
pub fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Restrict `path` to owner read/write (Unix). Filesystems that refuse
/// permission changes are tolerated.
pub fn set_private_permissions(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                tracing::debug!("cannot restrict permissions on {}: {e}", path.display());
            }
            other => other?,
        }
    }
    let _ = path;
    Ok(())
}

/// Write `contents` to `<dir>/<prefix>-<uuid>.tmp`, restrict it to 0600,
/// sync, rename it over `target`, and re-assert the permissions.
///
/// # Errors
///
/// Returns the first I/O error; the temp file is removed in that case.
pub fn write_private_atomic(
    dir: &Path,
    prefix: &str,
    target: &Path,
    contents: &[u8],
) -> std::io::Result<()> {
    let tmp_path = dir.join(format!("{prefix}-{}.tmp", uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(contents)?;
        set_private_permissions(&tmp_path)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp_path, target)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    set_private_permissions(target)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("doc.json");
        std::fs::write(&target, "old").unwrap();

        write_private_atomic(dir.path(), "doc", &target, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn failed_rename_cleans_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // Renaming a file over a non-empty directory fails everywhere.
        let target = dir.path().join("occupied");
        std::fs::create_dir_all(target.join("child")).unwrap();

        assert!(write_private_atomic(dir.path(), "doc", &target, b"data").is_err());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn private_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        create_private_dir(&nested).unwrap();
        let mode = std::fs::metadata(&nested).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
