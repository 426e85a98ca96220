use crate::PackageError;
use ovakit_core::output::ARTIFACT_DIR_MODE;
use ovakit_core::FileReference;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Private staging directory for OVA and directory outputs.
///
/// Created next to the final output so the last step is a same-filesystem
/// rename. Removed on drop unless committed as a directory.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(parent: &Path, basename: &str) -> Result<Self, PackageError> {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        let dir = tempfile::Builder::new()
            .prefix(&format!("{basename}-"))
            .tempdir_in(parent)?;
        debug!("workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Link a payload into the workspace under its basename.
    pub fn link_payload(&self, file: &FileReference) -> Result<PathBuf, PackageError> {
        let link = self.join(&file.file_name());
        std::os::unix::fs::symlink(&file.path, &link)?;
        Ok(link)
    }

    /// Move the workspace to `dest`, which must not exist yet.
    ///
    /// `dest` is claimed with `create_dir` first, so a directory that
    /// appears concurrently is never replaced. The rename then only
    /// succeeds over the still-empty claim.
    pub fn commit_dir(self, dest: &Path) -> Result<PathBuf, PackageError> {
        match fs::create_dir(dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PackageError::OutputExists(dest.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }
        fs::set_permissions(
            self.dir.path(),
            fs::Permissions::from_mode(ARTIFACT_DIR_MODE),
        )?;
        if let Err(e) = fs::rename(self.dir.path(), dest) {
            if let Err(cleanup) = fs::remove_dir(dest) {
                warn!("failed to remove {}: {cleanup}", dest.display());
            }
            return Err(e.into());
        }
        Ok(dest.to_path_buf())
    }
}
