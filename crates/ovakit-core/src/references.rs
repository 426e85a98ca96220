use crate::disk::AllocationUnits;
use crate::CoreError;
use ovakit_schema::{DiskId, FileId};
use std::fs;
use std::path::{Path, PathBuf};

/// A payload file listed in the `References` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    pub id: FileId,
    /// Absolute path, without resolving symlinks.
    pub path: PathBuf,
    pub size: u64,
}

impl FileReference {
    pub fn from_path(path: &Path, id: FileId) -> Result<Self, CoreError> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let size = fs::metadata(&path)
            .map_err(|source| CoreError::ReadFile {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(Self { id, path, size })
    }

    /// Name of the file inside the package (`ovf:href`).
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn host_resource(&self) -> String {
        format!("ovf:/file/{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskBacking {
    /// Backed by a file in `References`.
    File { file_id: FileId, populated_size: u64 },
    /// Capacity-only placeholder.
    Empty,
}

/// An entry in the `DiskSection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskReference {
    pub id: DiskId,
    pub capacity: u64,
    pub units: AllocationUnits,
    pub backing: DiskBacking,
}

impl DiskReference {
    pub fn host_resource(&self) -> String {
        format!("ovf:/disk/{}", self.id)
    }

    pub fn file_id(&self) -> Option<&FileId> {
        match &self.backing {
            DiskBacking::File { file_id, .. } => Some(file_id),
            DiskBacking::Empty => None,
        }
    }
}
