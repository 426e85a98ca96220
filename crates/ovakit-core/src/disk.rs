use crate::CoreError;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const VMDK_CONVERT: &str = "vmdk-convert";

/// Sizes reported for a disk image, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DiskInfo {
    pub capacity: u64,
    pub used: u64,
}

/// External collaborator that inspects and converts disk images.
pub trait DiskInspector: Send + Sync {
    fn name(&self) -> &str;

    fn inspect(&self, path: &Path) -> Result<DiskInfo, CoreError>;

    /// Convert a raw image into a stream-optimized VMDK at `dest`.
    fn convert(&self, raw: &Path, dest: &Path) -> Result<(), CoreError>;
}

/// `vmdk-convert` subprocess backend.
pub struct VmdkConvert {
    program: PathBuf,
}

impl Default for VmdkConvert {
    fn default() -> Self {
        Self::new(VMDK_CONVERT)
    }
}

impl VmdkConvert {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn tool_error(&self, message: String) -> CoreError {
        CoreError::ExternalTool {
            tool: self.program.display().to_string(),
            message,
        }
    }
}

impl DiskInspector for VmdkConvert {
    fn name(&self) -> &str {
        VMDK_CONVERT
    }

    fn inspect(&self, path: &Path) -> Result<DiskInfo, CoreError> {
        debug!("inspecting {}", path.display());
        let output = Command::new(&self.program)
            .arg("-i")
            .arg(path)
            .output()
            .map_err(|e| self.tool_error(format!("failed to launch: {e}")))?;

        if !output.status.success() {
            return Err(self.tool_error(format!(
                "inspecting {} exited with {}: {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn convert(&self, raw: &Path, dest: &Path) -> Result<(), CoreError> {
        let output = Command::new(&self.program)
            .arg(raw)
            .arg(dest)
            .output()
            .map_err(|e| self.tool_error(format!("failed to launch: {e}")))?;

        if !output.status.success() {
            return Err(self.tool_error(format!(
                "converting {} exited with {}: {}",
                raw.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// `ovf:capacityAllocationUnits` of a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationUnits {
    Byte,
    KiB,
    MiB,
    GiB,
    TiB,
}

impl AllocationUnits {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::KiB => "byte * 2^10",
            Self::MiB => "byte * 2^20",
            Self::GiB => "byte * 2^30",
            Self::TiB => "byte * 2^40",
        }
    }

    pub fn factor(self) -> u64 {
        match self {
            Self::Byte => 1,
            Self::KiB => 1 << 10,
            Self::MiB => 1 << 20,
            Self::GiB => 1 << 30,
            Self::TiB => 1 << 40,
        }
    }

    /// Whole units in `bytes`, rounded down.
    pub fn whole_units(self, bytes: u64) -> u64 {
        bytes / self.factor()
    }
}

impl FromStr for AllocationUnits {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "byte" => Ok(Self::Byte),
            "KB" | "byte * 2^10" => Ok(Self::KiB),
            "MB" | "byte * 2^20" => Ok(Self::MiB),
            "GB" | "byte * 2^30" => Ok(Self::GiB),
            "TB" | "byte * 2^40" => Ok(Self::TiB),
            other => Err(CoreError::Validation(format!(
                "invalid disk units '{other}' (expected byte, KB, MB, GB or TB)"
            ))),
        }
    }
}

impl fmt::Display for AllocationUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bring `prepared` up to date with `raw`.
///
/// Converts only when `prepared` is missing or older than `raw`. A missing
/// raw image is not an error: the prepared image is used as-is. Returns
/// whether a conversion ran.
pub fn prepare_disk_image(
    inspector: &dyn DiskInspector,
    raw: &Path,
    prepared: &Path,
) -> Result<bool, CoreError> {
    let Ok(raw_meta) = fs::metadata(raw) else {
        warn!(
            "raw image file {} does not exist, using {}",
            raw.display(),
            prepared.display()
        );
        return Ok(false);
    };

    let stale = match fs::metadata(prepared) {
        Ok(prepared_meta) => raw_meta.modified()? > prepared_meta.modified()?,
        Err(_) => true,
    };

    if !stale {
        debug!("{} is up to date", prepared.display());
        return Ok(false);
    }

    info!(
        "converting {} to {} with {}",
        raw.display(),
        prepared.display(),
        inspector.name()
    );
    inspector.convert(raw, prepared)?;
    Ok(true)
}
