use crate::context::ConversionContext;
use crate::disk::DiskInspector;
use crate::graph::HardwareGraph;
use crate::references::{DiskReference, FileReference};
use crate::CoreError;
use ovakit_schema::{
    ConfigDocument, NetworkId, OrderedMap, ProductSpec, ProfileId, PropertySpec, PropertyValue,
    ScalarValue, SystemSection, TextBlockSpec,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use tracing::{debug, info};

/// Vendor settings written after the hardware items unless
/// `no_default_configs` is set.
pub const VENDOR_CONFIG_DEFAULTS: &[(&str, &str)] = &[
    ("cpuHotAddEnabled", "false"),
    ("cpuHotRemoveEnabled", "false"),
    ("memoryHotAddEnabled", "false"),
    ("firmware", "bios"),
    ("tools.syncTimeWithHost", "false"),
    ("tools.afterPowerOn", "true"),
    ("tools.afterResume", "true"),
    ("tools.beforeGuestShutdown", "true"),
    ("tools.beforeGuestStandby", "true"),
    ("tools.toolsUpgradePolicy", "manual"),
    ("powerOpInfo.powerOffType", "soft"),
    ("powerOpInfo.resetType", "soft"),
    ("powerOpInfo.suspendType", "hard"),
    ("powerOpInfo.standbyAction", "checkpoint"),
    ("nestedHVEnabled", "false"),
    ("virtualICH7MPresent", "false"),
    ("virtualSMCPresent", "false"),
    ("flags.vvtdEnabled", "false"),
    ("flags.vbsEnabled", "false"),
    ("bootOptions.efiSecureBootEnabled", "false"),
];

/// Default `Info` for product sections and for annotation and EULA blocks.
const PRODUCT_INFO: &str = "Information about the installed software";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
}

impl Network {
    pub fn description(&self) -> String {
        format!("The {} Network", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub property_type: String,
    /// Default value (`ovf:value`).
    pub value: Option<String>,
    /// Per-profile overrides, rendered as `Value` children.
    pub profile_values: Vec<(ProfileId, String)>,
    pub qualifiers: Option<String>,
    pub user_configurable: bool,
    pub configuration: Option<ProfileId>,
    pub password: bool,
    pub required: Option<bool>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl Property {
    fn from_spec(key: &str, spec: &PropertySpec) -> Self {
        let (value, profile_values) = match &spec.value {
            None => (None, Vec::new()),
            Some(PropertyValue::Scalar(v)) => (Some(v.to_string()), Vec::new()),
            Some(PropertyValue::PerProfile {
                default,
                configurations,
            }) => (
                default.as_ref().map(ScalarValue::to_string),
                configurations
                    .iter()
                    .map(|(profile, v)| (ProfileId::new(profile.as_str()), v.to_string()))
                    .collect(),
            ),
        };
        Self {
            key: key.to_owned(),
            property_type: spec.property_type.clone(),
            value,
            profile_values,
            qualifiers: spec.qualifiers.clone(),
            user_configurable: spec.user_configurable,
            configuration: spec.configuration.as_deref().map(ProfileId::new),
            password: spec.password,
            required: spec.required,
            label: spec.label.clone(),
            description: spec.description.clone(),
            category: spec.category.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSection {
    pub info: String,
    pub product: Option<String>,
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub full_version: Option<String>,
    pub class_name: Option<String>,
    pub instance: Option<String>,
    pub required: Option<bool>,
    pub properties: Vec<Property>,
    /// Category id and label, in declaration order.
    pub categories: Vec<(String, String)>,
    pub transports: Vec<String>,
}

impl ProductSection {
    fn from_spec(spec: &ProductSpec) -> Result<Self, CoreError> {
        let properties: Vec<Property> = spec
            .properties
            .iter()
            .map(|(key, p)| Property::from_spec(key, p))
            .collect();

        for prop in &properties {
            if let Some(category) = &prop.category {
                if !spec.categories.contains_key(category) {
                    return Err(CoreError::Reference {
                        referrer: format!("property '{}'", prop.key),
                        kind: "category",
                        id: category.clone(),
                    });
                }
            }
        }

        Ok(Self {
            info: spec.info.clone().unwrap_or_else(|| PRODUCT_INFO.to_owned()),
            product: spec.product.clone(),
            vendor: spec.vendor.clone(),
            version: spec.version.clone(),
            full_version: spec.full_version.clone(),
            class_name: spec.class_name.clone(),
            instance: spec.instance.clone(),
            required: spec.required,
            properties,
            categories: spec
                .categories
                .iter()
                .map(|(id, label)| (id.clone(), label.clone()))
                .collect(),
            transports: spec.transports.clone(),
        })
    }

    /// Properties filed under `category`, or the uncategorized ones for `None`.
    pub fn properties_in<'a>(
        &'a self,
        category: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.category.as_deref() == category)
    }
}

/// Annotation or EULA text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub info: String,
    pub text: Option<String>,
}

impl TextBlock {
    fn load(spec: &TextBlockSpec) -> Result<Self, CoreError> {
        let text = match &spec.file {
            Some(path) => Some(fs::read_to_string(path).map_err(|source| CoreError::ReadFile {
                path: path.clone(),
                source,
            })?),
            None => spec.text.clone(),
        };
        Ok(Self {
            info: spec
                .info
                .clone()
                .unwrap_or_else(|| PRODUCT_INFO.to_owned()),
            text,
        })
    }
}

/// A deployment profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub id: ProfileId,
    pub label: String,
    pub description: String,
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraConfig {
    pub key: String,
    pub value: String,
    pub required: Option<bool>,
}

/// The resolved appliance: hardware graph plus descriptor metadata.
///
/// Built once per conversion by `from_document`; everything downstream only
/// reads it.
#[derive(Debug)]
pub struct VirtualMachine {
    pub name: String,
    pub system_type: String,
    pub os_cim: u32,
    pub os_vmw: String,
    pub os_name: Option<String>,
    pub hardware: HardwareGraph,
    pub networks: OrderedMap<NetworkId, Network>,
    pub products: Vec<ProductSection>,
    pub annotation: Option<TextBlock>,
    pub eula: Option<TextBlock>,
    pub configurations: Vec<Configuration>,
    pub extra_configs: Vec<ExtraConfig>,
    /// Global `vmw:Config` settings, sorted by key.
    pub vendor_config: BTreeMap<String, String>,
}

impl VirtualMachine {
    pub fn from_document(
        doc: &ConfigDocument,
        inspector: &dyn DiskInspector,
    ) -> Result<Self, CoreError> {
        let hardware_section = doc.hardware()?;
        let vendor_config = vendor_config(&doc.system)?;
        let products = products(doc)?;
        let configurations = configurations(doc)?;
        let extra_configs = doc
            .extra_configs
            .iter()
            .map(|(key, xc)| ExtraConfig {
                key: key.clone(),
                value: xc.value.to_string(),
                required: xc.required,
            })
            .collect();
        let networks: OrderedMap<NetworkId, Network> = doc
            .networks
            .iter()
            .map(|(id, n)| {
                (
                    NetworkId::new(id.as_str()),
                    Network {
                        name: n.name.clone(),
                    },
                )
            })
            .collect();

        let mut ctx = ConversionContext::new();
        let mut hardware = HardwareGraph::construct(hardware_section, &mut ctx, inspector)?;
        hardware.connect(&networks)?;
        debug!("hardware graph connected");

        let annotation = doc
            .annotation
            .as_ref()
            .map(TextBlock::load)
            .transpose()?;
        let eula = doc
            .eula
            .as_ref()
            .map(TextBlock::load)
            .transpose()?;

        info!(
            "built '{}': {} hardware items, {} files, {} disks",
            doc.system.name,
            hardware.len(),
            hardware.files().len(),
            hardware.disks().len()
        );

        Ok(Self {
            name: doc.system.name.clone(),
            system_type: doc.system.system_type.clone(),
            os_cim: doc.system.os_cim,
            os_vmw: doc.system.os_vmw.clone(),
            os_name: doc.system.os_name.clone(),
            hardware,
            networks,
            products,
            annotation,
            eula,
            configurations,
            extra_configs,
            vendor_config,
        })
    }

    pub fn files(&self) -> &[FileReference] {
        self.hardware.files()
    }

    pub fn disks(&self) -> &[DiskReference] {
        self.hardware.disks()
    }

    /// `ovf:transport` of the hardware section: the sorted union of all
    /// product transports, present whenever a product section exists.
    pub fn transports(&self) -> Option<String> {
        if self.products.is_empty() {
            return None;
        }
        let all: BTreeSet<&str> = self
            .products
            .iter()
            .flat_map(|p| p.transports.iter().map(String::as_str))
            .collect();
        Some(all.into_iter().collect::<Vec<_>>().join(" "))
    }
}

fn vendor_config(system: &SystemSection) -> Result<BTreeMap<String, String>, CoreError> {
    let mut config = BTreeMap::new();
    if !system.no_default_configs {
        for (k, v) in VENDOR_CONFIG_DEFAULTS {
            config.insert((*k).to_owned(), (*v).to_owned());
        }
    }

    if let Some(firmware) = &system.firmware {
        match firmware {
            ScalarValue::Text(fw) if fw == "bios" || fw == "efi" => {
                config.insert("firmware".to_owned(), fw.clone());
            }
            other => {
                return Err(CoreError::Validation(format!(
                    "system.firmware must be 'bios' or 'efi', got '{other}'"
                )));
            }
        }
    }

    if let Some(secure_boot) = &system.secure_boot {
        let Some(enabled) = secure_boot.as_bool() else {
            return Err(CoreError::Validation(format!(
                "system.secure_boot must be a boolean, got '{secure_boot}'"
            )));
        };
        config.insert(
            "bootOptions.efiSecureBootEnabled".to_owned(),
            enabled.to_string(),
        );
    }

    Ok(config)
}

fn products(doc: &ConfigDocument) -> Result<Vec<ProductSection>, CoreError> {
    if doc.product.is_some() && doc.product_sections.is_some() {
        return Err(CoreError::Validation(
            "can only have one of 'product' or 'product_sections'".to_owned(),
        ));
    }

    // environment settings belong to the primary product section
    let primary = match (&doc.product, &doc.environment) {
        (product, Some(env)) => {
            let mut p = product.clone().unwrap_or_default();
            if let Some(transports) = &env.transports {
                p.transports.clone_from(transports);
            }
            if let Some(properties) = &env.properties {
                p.properties.clone_from(properties);
            }
            if let Some(categories) = &env.categories {
                p.categories.clone_from(categories);
            }
            Some(p)
        }
        (product, None) => product.clone(),
    };

    primary
        .iter()
        .chain(doc.product_sections.iter().flatten())
        .map(ProductSection::from_spec)
        .collect()
}

fn configurations(doc: &ConfigDocument) -> Result<Vec<Configuration>, CoreError> {
    let mut configs: Vec<Configuration> = doc
        .configurations
        .iter()
        .map(|(id, c)| Configuration {
            id: ProfileId::new(id.as_str()),
            label: c.label.clone(),
            description: c.description.clone(),
            default: c.default,
        })
        .collect();

    if let Some(default) = &doc.system.default_configuration {
        if !configs.iter().any(|c| c.id == default.as_str()) {
            return Err(CoreError::Reference {
                referrer: "system.default_configuration".to_owned(),
                kind: "configuration",
                id: default.clone(),
            });
        }
        for c in &mut configs {
            c.default = c.id == default.as_str();
        }
    }

    let defaults = configs.iter().filter(|c| c.default).count();
    if defaults > 1 {
        return Err(CoreError::Validation(format!(
            "at most one configuration may be the default, found {defaults}"
        )));
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockInspector;
    use ovakit_schema::{parse_document_str, ParamSet};

    const HEADER: &str = "system:\n  name: vm\n  type: vmx-14\nhardware:\n  cpus: 1\n";

    fn build(extra: &str) -> Result<VirtualMachine, CoreError> {
        let doc = parse_document_str(&format!("{HEADER}{extra}"), &ParamSet::new())?;
        VirtualMachine::from_document(&doc, &MockInspector::new())
    }

    #[test]
    fn vendor_defaults_are_applied() {
        let vm = build("").unwrap();
        assert_eq!(vm.vendor_config.len(), VENDOR_CONFIG_DEFAULTS.len());
        assert_eq!(vm.vendor_config["firmware"], "bios");
    }

    #[test]
    fn no_default_configs_keeps_only_overrides() {
        let doc = parse_document_str(
            "system:\n  name: vm\n  type: vmx-14\n  no_default_configs: true\n  firmware: efi\nhardware:\n  cpus: 1\n",
            &ParamSet::new(),
        )
        .unwrap();
        let vm = VirtualMachine::from_document(&doc, &MockInspector::new()).unwrap();
        assert_eq!(vm.vendor_config.len(), 1);
        assert_eq!(vm.vendor_config["firmware"], "efi");
    }

    #[test]
    fn firmware_and_secure_boot_are_validated() {
        let doc = parse_document_str(
            "system:\n  name: vm\n  type: vmx-14\n  firmware: uefi\nhardware:\n  cpus: 1\n",
            &ParamSet::new(),
        )
        .unwrap();
        let err = VirtualMachine::from_document(&doc, &MockInspector::new()).unwrap_err();
        assert!(err.to_string().contains("firmware"));

        let doc = parse_document_str(
            "system:\n  name: vm\n  type: vmx-14\n  secure_boot: \"yes\"\nhardware:\n  cpus: 1\n",
            &ParamSet::new(),
        )
        .unwrap();
        let err = VirtualMachine::from_document(&doc, &MockInspector::new()).unwrap_err();
        assert!(err.to_string().contains("secure_boot"));
    }

    #[test]
    fn secure_boot_overrides_default() {
        let doc = parse_document_str(
            "system:\n  name: vm\n  type: vmx-14\n  secure_boot: true\nhardware:\n  cpus: 1\n",
            &ParamSet::new(),
        )
        .unwrap();
        let vm = VirtualMachine::from_document(&doc, &MockInspector::new()).unwrap();
        assert_eq!(vm.vendor_config["bootOptions.efiSecureBootEnabled"], "true");
    }

    #[test]
    fn environment_merges_into_product() {
        let vm = build(
            "product:\n  product: Photon\n  transports: [iso]\n\
             environment:\n  transports: [com.vmware.guestInfo]\n  properties:\n    a.b:\n      type: string\n",
        )
        .unwrap();
        assert_eq!(vm.products.len(), 1);
        assert_eq!(vm.products[0].product.as_deref(), Some("Photon"));
        assert_eq!(vm.products[0].transports, vec!["com.vmware.guestInfo"]);
        assert_eq!(vm.products[0].properties[0].key, "a.b");
    }

    #[test]
    fn environment_alone_creates_product() {
        let vm = build("environment:\n  transports: [iso]\n").unwrap();
        assert_eq!(vm.products.len(), 1);
        assert_eq!(vm.products[0].info, PRODUCT_INFO);
        assert_eq!(vm.transports().as_deref(), Some("iso"));
    }

    #[test]
    fn product_and_product_sections_are_exclusive() {
        let err = build("product:\n  product: a\nproduct_sections:\n  - product: b\n").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn transports_are_sorted_and_deduplicated() {
        let vm = build(
            "product_sections:\n  - transports: [iso, com.vmware.guestInfo]\n  - transports: [iso]\n",
        )
        .unwrap();
        assert_eq!(vm.transports().as_deref(), Some("com.vmware.guestInfo iso"));
    }

    #[test]
    fn no_products_means_no_transport() {
        assert!(build("").unwrap().transports().is_none());
    }

    #[test]
    fn unknown_category_is_reference_error() {
        let err = build(
            "product:\n  properties:\n    k:\n      type: string\n      category: missing\n",
        )
        .unwrap_err();
        match err {
            CoreError::Reference { referrer, kind, id } => {
                assert!(referrer.contains('k'));
                assert_eq!(kind, "category");
                assert_eq!(id, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn per_profile_property_values() {
        let vm = build(
            "product:\n  properties:\n    size:\n      type: string\n      value:\n        default: s\n        configurations:\n          large: l\n",
        )
        .unwrap();
        let prop = &vm.products[0].properties[0];
        assert_eq!(prop.value.as_deref(), Some("s"));
        assert_eq!(prop.profile_values, vec![(ProfileId::new("large"), "l".to_owned())]);
    }

    #[test]
    fn default_configuration_is_applied() {
        let vm = build(
            "configurations:\n  small:\n    label: S\n    description: s\n    default: true\n  large:\n    label: L\n    description: l\n",
        )
        .unwrap();
        assert!(vm.configurations[0].default);

        let doc = parse_document_str(
            "system:\n  name: vm\n  type: vmx-14\n  default_configuration: large\nhardware:\n  cpus: 1\n\
             configurations:\n  small:\n    label: S\n    description: s\n    default: true\n  large:\n    label: L\n    description: l\n",
            &ParamSet::new(),
        )
        .unwrap();
        let vm = VirtualMachine::from_document(&doc, &MockInspector::new()).unwrap();
        assert!(!vm.configurations[0].default);
        assert!(vm.configurations[1].default);
    }

    #[test]
    fn unknown_default_configuration_is_reference_error() {
        let doc = parse_document_str(
            "system:\n  name: vm\n  type: vmx-14\n  default_configuration: huge\nhardware:\n  cpus: 1\n",
            &ParamSet::new(),
        )
        .unwrap();
        let err = VirtualMachine::from_document(&doc, &MockInspector::new()).unwrap_err();
        assert!(matches!(err, CoreError::Reference { kind: "configuration", .. }));
    }

    #[test]
    fn two_defaults_are_rejected() {
        let err = build(
            "configurations:\n  a:\n    label: A\n    description: a\n    default: true\n  b:\n    label: B\n    description: b\n    default: true\n",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn text_blocks_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let eula = dir.path().join("eula.txt");
        fs::write(&eula, "Do no harm.\n").unwrap();
        let vm = build(&format!(
            "annotation:\n  text: hello\neula:\n  file: {}\n",
            eula.display()
        ))
        .unwrap();
        let annotation = vm.annotation.unwrap();
        assert_eq!(annotation.info, "Information about the installed software");
        assert_eq!(annotation.text.as_deref(), Some("hello"));
        let eula = vm.eula.unwrap();
        assert_eq!(eula.info, "Information about the installed software");
        assert_eq!(eula.text.as_deref(), Some("Do no harm.\n"));
    }

    #[test]
    fn text_block_info_overrides_default() {
        let vm = build("annotation:\n  info: About this appliance\n  text: hi\neula:\n  text: terms\n")
            .unwrap();
        assert_eq!(vm.annotation.unwrap().info, "About this appliance");
        assert_eq!(vm.eula.unwrap().info, PRODUCT_INFO);
    }

    #[test]
    fn missing_text_block_file_names_path() {
        let err = build("eula:\n  file: /nonexistent/eula.txt\n").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/eula.txt"));
    }

    #[test]
    fn extra_configs_keep_declaration_order() {
        let vm = build(
            "extra_configs:\n  z.key:\n    value: 1\n  a.key:\n    value: true\n    required: false\n",
        )
        .unwrap();
        let keys: Vec<&str> = vm.extra_configs.iter().map(|x| x.key.as_str()).collect();
        assert_eq!(keys, vec!["z.key", "a.key"]);
        assert_eq!(vm.extra_configs[1].value, "true");
        assert_eq!(vm.extra_configs[1].required, Some(false));
    }
}
