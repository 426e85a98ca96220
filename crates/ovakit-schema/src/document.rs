use crate::params::{resolve_params, ParamSet};
use crate::types::{OrderedMap, ScalarValue};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Parsed appliance description.
///
/// Hardware entries are kept as raw YAML values: their shape depends on the
/// entry's kind, which is dispatched by the graph builder.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigDocument {
    pub system: SystemSection,
    #[serde(default)]
    pub hardware: Option<OrderedMap<String, serde_yaml::Value>>,
    #[serde(default)]
    pub networks: OrderedMap<String, NetworkSpec>,
    #[serde(default)]
    pub product: Option<ProductSpec>,
    #[serde(default)]
    pub product_sections: Option<Vec<ProductSpec>>,
    #[serde(default)]
    pub environment: Option<EnvironmentSpec>,
    #[serde(default)]
    pub annotation: Option<TextBlockSpec>,
    #[serde(default)]
    pub eula: Option<TextBlockSpec>,
    #[serde(default)]
    pub configurations: OrderedMap<String, ConfigurationSpec>,
    #[serde(default)]
    pub extra_configs: OrderedMap<String, ExtraConfigSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemSection {
    pub name: String,
    #[serde(rename = "type")]
    pub system_type: String,
    #[serde(default = "default_os_cim")]
    pub os_cim: u32,
    #[serde(default = "default_os_vmw")]
    pub os_vmw: String,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub firmware: Option<ScalarValue>,
    /// Kept untyped so that a non-boolean value is reported as a validation
    /// error naming the field rather than a generic parse failure.
    #[serde(default)]
    pub secure_boot: Option<ScalarValue>,
    #[serde(default)]
    pub default_configuration: Option<String>,
    #[serde(default)]
    pub no_default_configs: bool,
}

fn default_os_cim() -> u32 {
    100
}

fn default_os_vmw() -> String {
    "other4xLinux64Guest".to_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProductSpec {
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub full_version: Option<String>,
    #[serde(default, rename = "class")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub properties: OrderedMap<String, PropertySpec>,
    #[serde(default)]
    pub categories: OrderedMap<String, String>,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// `environment` carries the guest-visible properties; they belong to the
/// primary product section in the rendered descriptor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub transports: Option<Vec<String>>,
    #[serde(default)]
    pub properties: Option<OrderedMap<String, PropertySpec>>,
    #[serde(default)]
    pub categories: Option<OrderedMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertySpec {
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(default)]
    pub value: Option<PropertyValue>,
    #[serde(default)]
    pub password: bool,
    #[serde(default)]
    pub user_configurable: bool,
    #[serde(default)]
    pub qualifiers: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub configuration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Scalar(ScalarValue),
    PerProfile {
        #[serde(default)]
        default: Option<ScalarValue>,
        #[serde(default)]
        configurations: OrderedMap<String, ScalarValue>,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TextBlockSpec {
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigurationSpec {
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtraConfigSpec {
    pub value: ScalarValue,
    #[serde(default)]
    pub required: Option<bool>,
}

impl ConfigDocument {
    pub fn hardware(&self) -> Result<&OrderedMap<String, serde_yaml::Value>, ConfigError> {
        self.hardware.as_ref().ok_or(ConfigError::MissingHardware)
    }
}

/// Parse a document from YAML text, resolving `!param` tags first.
pub fn parse_document_str(input: &str, params: &ParamSet) -> Result<ConfigDocument, ConfigError> {
    let raw: serde_yaml::Value = serde_yaml::from_str(input)?;
    let resolved = resolve_params(raw, params)?;
    let doc: ConfigDocument = serde_yaml::from_value(resolved)?;
    if doc.hardware.is_none() {
        return Err(ConfigError::MissingHardware);
    }
    Ok(doc)
}

pub fn load_document(
    path: impl AsRef<Path>,
    params: &ParamSet,
) -> Result<ConfigDocument, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_document_str(&content, params)
}
