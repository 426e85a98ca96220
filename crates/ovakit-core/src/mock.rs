use crate::disk::{DiskInfo, DiskInspector};
use crate::CoreError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-process disk collaborator for tests.
///
/// `inspect` reports the file length as used space and, unless a fixed
/// capacity was configured, as capacity too. `convert` copies the raw image
/// verbatim and records the call.
#[derive(Default)]
pub struct MockInspector {
    capacity: Option<u64>,
    conversions: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl MockInspector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn conversions(&self) -> Vec<(PathBuf, PathBuf)> {
        self.conversions
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl DiskInspector for MockInspector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn inspect(&self, path: &Path) -> Result<DiskInfo, CoreError> {
        let len = fs::metadata(path)
            .map_err(|source| CoreError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        Ok(DiskInfo {
            capacity: self.capacity.unwrap_or(len),
            used: len,
        })
    }

    fn convert(&self, raw: &Path, dest: &Path) -> Result<(), CoreError> {
        fs::copy(raw, dest)?;
        let mut conversions = self.conversions.lock().map_err(|e| CoreError::ExternalTool {
            tool: "mock".to_owned(),
            message: format!("mutex poisoned: {e}"),
        })?;
        conversions.push((raw.to_path_buf(), dest.to_path_buf()));
        Ok(())
    }
}
