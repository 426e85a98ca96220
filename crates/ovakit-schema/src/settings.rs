use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CHECKSUM: &str = "sha256";
pub const DEFAULT_TAR_FORMAT: &str = "gnu";
pub const DEFAULT_VMDK_CONVERT: &str = "vmdk-convert";
pub const DEFAULT_OPENSSL: &str = "openssl";

/// Tool defaults from `~/.config/ovakit/config.toml`.
///
/// Every field is optional; command-line flags override the file, and the
/// file overrides the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSettings {
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub tar_format: Option<String>,
    #[serde(default)]
    pub vmdk_convert: Option<PathBuf>,
    #[serde(default)]
    pub openssl: Option<PathBuf>,
}

impl ToolSettings {
    /// Load from the default location. A missing file yields empty settings.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_settings_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn checksum(&self) -> &str {
        self.checksum.as_deref().unwrap_or(DEFAULT_CHECKSUM)
    }

    pub fn tar_format(&self) -> &str {
        self.tar_format.as_deref().unwrap_or(DEFAULT_TAR_FORMAT)
    }

    pub fn vmdk_convert(&self) -> &Path {
        self.vmdk_convert
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_VMDK_CONVERT))
    }

    pub fn openssl(&self) -> &Path {
        self.openssl
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_OPENSSL))
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/ovakit/config.toml"))
}
