//! Atomic writes for files that end up in a distributed package.
//!
//! Temporary files are created owner-only; committed artifacts get the usual
//! world-readable modes instead.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;

pub const ARTIFACT_FILE_MODE: u32 = 0o644;
pub const ARTIFACT_DIR_MODE: u32 = 0o755;

/// Directory a file at `path` lives in; `.` for bare names.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Temp file next to `dest`, so the final rename stays on one filesystem.
pub fn temp_beside(dest: &Path) -> io::Result<NamedTempFile> {
    NamedTempFile::new_in(parent_dir(dest))
}

/// Sync `tmp`, give it the artifact mode and rename it to `dest`.
pub fn persist_artifact(tmp: NamedTempFile, dest: &Path) -> io::Result<()> {
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(ARTIFACT_FILE_MODE))?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_artifact(dest: &Path, content: &[u8]) -> io::Result<()> {
    let mut tmp = temp_beside(dest)?;
    tmp.write_all(content)?;
    persist_artifact(tmp, dest)
}
