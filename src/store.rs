//! File and backup store
//!
//! All on-disk side effects funnel through here: reads, writes guarded by
//! a backup/restore dance, directory (re)creation with explicit modes,
//! and the annotated-line revert used for /etc/hosts.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Sentinel prefixing lines the tool commented out
pub const DISABLED_MARKER: &str = "#[-] ";

/// Sentinel suffixing lines the tool added
pub const ADDED_MARKER: &str = "#[+]";

/// Read a file's full contents
pub async fn read(path: impl AsRef<Path>) -> Result<String> {
    Ok(fs::read_to_string(path).await?)
}

/// Write `contents` to `path`, first moving any existing file to
/// `backup`. If the write fails after the backup succeeded, a restore is
/// attempted and the error reports whether it worked.
pub async fn write_with_backup(
    contents: &str,
    path: impl AsRef<Path>,
    backup: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    let backup = backup.as_ref();

    let had_original = fs::try_exists(path).await.unwrap_or(false);
    if had_original {
        fs::rename(path, backup).await?;
        debug!("backed up {} to {}", path.display(), backup.display());
    }

    if let Err(write_err) = fs::write(path, contents).await {
        if had_original {
            return match fs::rename(backup, path).await {
                Ok(()) => Err(Error::composite(
                    format!("write of {} failed: {write_err}", path.display()),
                    "original restored from backup",
                )),
                Err(restore_err) => Err(Error::composite(
                    format!("write of {} failed: {write_err}", path.display()),
                    format!("restore from backup failed: {restore_err}"),
                )),
            };
        }
        return Err(write_err.into());
    }
    Ok(())
}

/// Create a directory (and parents) with the given mode
pub async fn ensure_dir(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

/// Remove a directory tree, then recreate it empty with the given mode
pub async fn recreate_dir(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    let path = path.as_ref();
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    ensure_dir(path, mode).await
}

/// Write a file and set its mode
pub async fn write_file(path: impl AsRef<Path>, contents: &str, mode: u32) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, contents).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

/// chmod 0777; used on the rewritten config file so the operator can
/// still edit it after the tool ran as root
pub async fn chmod_open(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o777)).await?;
    Ok(())
}

/// Remove a file, tolerating its absence
pub async fn remove_file_if_present(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("skipping removal of {}, not present", path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Undo an annotated edit: lines carrying the disabled marker are
/// uncommented, lines carrying the added marker are dropped, everything
/// else passes through unchanged.
pub fn annotated_revert(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for line in contents.lines() {
        if line.contains(ADDED_MARKER) {
            continue;
        }
        if let Some(original) = line.strip_prefix(DISABLED_MARKER) {
            out.push_str(original);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}
