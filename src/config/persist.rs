//! Atomic file writes.
//!
//! Every durable file the client owns (config TOML, integration store JSON)
//! is replaced with temp file → fsync → rename, so a crash mid-write never
//! leaves a truncated file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the temp file used while replacing `path`.
fn temp_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_extension(format!("{ext}.tmp")),
        None => path.with_extension("tmp"),
    }
}

/// Write `contents` to `path` atomically, creating parent directories.
///
/// # Errors
/// Returns the underlying I/O error with the failing path in its message.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp_path = temp_path(path);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("failed to create directory '{}': {e}", parent.display()),
            )
        })?;
    }

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("failed to create temp file '{}': {e}", tmp_path.display()),
        )
    })?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        std::io::Error::new(
            e.kind(),
            format!(
                "failed to rename '{}' to '{}': {e}",
                tmp_path.display(),
                path.display()
            ),
        )
    })
}
