//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! the write-temp-then-rename primitive used by every persisted entity.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error("creating directory", path, e))
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    ensure_dir_all(parent).await
}

/// Sibling temp path used while replacing `path` (`links.json` -> `links.json.tmp`).
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `contents` atomically.
///
/// The data is written and synced to a temp file in the same directory, then
/// renamed over the target, so readers see either the old or the new file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path).await?;
    let tmp = temp_path(path);

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| io_error("creating temp file", &tmp, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| io_error("writing temp file", &tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| io_error("syncing temp file", &tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error("replacing file", path, e))
}
