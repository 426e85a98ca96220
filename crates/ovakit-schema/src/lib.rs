//! Configuration document model, `!param` substitution, and tool settings for ovakit.
//!
//! This crate defines the input layer: the YAML appliance description
//! (`ConfigDocument`) with its system, hardware, network, product, annotation,
//! EULA, deployment-profile, and extra-config sections; resolution of
//! `!param` tags against caller-supplied values (`resolve_params`); typed
//! per-kind hardware entry specs; and the optional TOML tool settings file
//! (`ToolSettings`).

pub mod document;
pub mod hardware;
pub mod params;
pub mod settings;
pub mod types;

pub use document::{
    load_document, parse_document_str, ConfigDocument, ConfigurationSpec, EnvironmentSpec,
    ExtraConfigSpec, NetworkSpec, ProductSpec, PropertySpec, PropertyValue, SystemSection,
    TextBlockSpec,
};
pub use hardware::{
    BasicSpec, CdDriveSpec, ControllerSpec, CpuSpec, EthernetSpec, FloppySpec, HardDiskSpec,
    ItemCommon, MemorySpec,
};
pub use params::{parse_param_arg, resolve_params, ParamSet};
pub use settings::ToolSettings;
pub use types::{DiskId, FileId, HardwareId, NetworkId, OrderedMap, ProfileId, ScalarValue};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("failed to parse settings file: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("configuration needs a 'hardware' section")]
    MissingHardware,
    #[error("no param set for '{0}', and there is no default")]
    MissingParam(String),
    #[error("param name must be a string, got: {0}")]
    InvalidParamName(String),
    #[error("invalid --param argument '{0}', expected '<key>=<value>'")]
    InvalidParamArg(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_missing_param() {
        let e = ConfigError::MissingParam("rootdisk".to_owned());
        assert!(e.to_string().contains("rootdisk"));
    }

    #[test]
    fn config_error_display_invalid_param_arg() {
        let e = ConfigError::InvalidParamArg("novalue".to_owned());
        let msg = e.to_string();
        assert!(msg.contains("novalue"));
        assert!(msg.contains("<key>=<value>"));
    }
}
