//! Typed shapes of the entries in the `hardware` section.
//!
//! The document keeps each entry as raw YAML; once the graph builder has
//! picked the kind it deserializes the entry into the matching spec here.

use crate::types::ScalarValue;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Fields every hardware entry may carry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItemCommon {
    /// Vendor `vmw:Config` extension, merged over per-kind defaults.
    #[serde(default)]
    pub config: BTreeMap<String, ScalarValue>,
    /// Deployment profile this item belongs to.
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

impl Default for ItemCommon {
    fn default() -> Self {
        Self {
            config: BTreeMap::new(),
            configuration: None,
            required: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CpuForm {
    Count(u32),
    Detailed {
        number: u32,
        #[serde(flatten)]
        common: ItemCommon,
    },
}

/// `cpus: 2` or `cpus: {number: 2, config: ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "CpuForm")]
pub struct CpuSpec {
    pub number: u32,
    pub common: ItemCommon,
}

impl From<CpuForm> for CpuSpec {
    fn from(form: CpuForm) -> Self {
        match form {
            CpuForm::Count(number) => Self {
                number,
                common: ItemCommon::default(),
            },
            CpuForm::Detailed { number, common } => Self { number, common },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MemoryForm {
    Size(u64),
    Detailed {
        size: u64,
        #[serde(flatten)]
        common: ItemCommon,
    },
}

/// `memory: 4096` or `memory: {size: 4096, ...}`; size is in MiB.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "MemoryForm")]
pub struct MemorySpec {
    pub size: u64,
    pub common: ItemCommon,
}

impl From<MemoryForm> for MemorySpec {
    fn from(form: MemoryForm) -> Self {
        match form {
            MemoryForm::Size(size) => Self {
                size,
                common: ItemCommon::default(),
            },
            MemoryForm::Detailed { size, common } => Self { size, common },
        }
    }
}

/// SCSI, SATA, NVMe and IDE controllers. Only SCSI honours `subtype`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControllerSpec {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(flatten)]
    pub common: ItemCommon,
}

/// Kinds with nothing beyond the common fields (USB, VMCI, video card).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BasicSpec {
    #[serde(flatten)]
    pub common: ItemCommon,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CdDriveSpec {
    pub parent: String,
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub connected: bool,
    #[serde(flatten)]
    pub common: ItemCommon,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FloppySpec {
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub connected: bool,
    #[serde(flatten)]
    pub common: ItemCommon,
}

/// A hard disk backed by a prepared image, a raw image to convert, or an
/// empty placeholder of `disk_capacity` units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HardDiskSpec {
    pub parent: String,
    #[serde(default)]
    pub disk_image: Option<PathBuf>,
    #[serde(default)]
    pub raw_image: Option<PathBuf>,
    #[serde(default)]
    pub disk_capacity: Option<u64>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub disk_id: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(flatten)]
    pub common: ItemCommon,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EthernetSpec {
    pub network: String,
    pub subtype: String,
    #[serde(default = "default_true")]
    pub connected: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(flatten)]
    pub common: ItemCommon,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_shorthand_and_detailed() {
        let short: CpuSpec = serde_yaml::from_str("4").unwrap();
        assert_eq!(short.number, 4);
        assert!(short.common.required);
        assert!(short.common.config.is_empty());

        let full: CpuSpec =
            serde_yaml::from_str("number: 2\nconfig:\n  numCoresPerSocket: 2\n").unwrap();
        assert_eq!(full.number, 2);
        assert_eq!(
            full.common.config.get("numCoresPerSocket"),
            Some(&ScalarValue::Integer(2))
        );
    }

    #[test]
    fn memory_detailed_ignores_type_tag() {
        let m: MemorySpec =
            serde_yaml::from_str("type: memory\nsize: 2048\nconfiguration: large\n").unwrap();
        assert_eq!(m.size, 2048);
        assert_eq!(m.common.configuration.as_deref(), Some("large"));
    }

    #[test]
    fn cd_drive_defaults_disconnected() {
        let cd: CdDriveSpec =
            serde_yaml::from_str("type: cd_drive\nparent: sata0\nimage: seed.iso\n").unwrap();
        assert_eq!(cd.parent, "sata0");
        assert_eq!(cd.image, Some(PathBuf::from("seed.iso")));
        assert!(!cd.connected);
    }

    #[test]
    fn ethernet_defaults_connected() {
        let eth: EthernetSpec =
            serde_yaml::from_str("type: ethernet\nnetwork: vm_network\nsubtype: VmxNet3\n")
                .unwrap();
        assert!(eth.connected);
        assert!(eth.address.is_none());
    }

    #[test]
    fn ethernet_requires_subtype() {
        let r: Result<EthernetSpec, _> = serde_yaml::from_str("type: ethernet\nnetwork: n\n");
        assert!(r.is_err());
    }

    #[test]
    fn hard_disk_requires_parent() {
        let r: Result<HardDiskSpec, _> = serde_yaml::from_str("type: hard_disk\ndisk_capacity: 10\n");
        assert!(r.is_err());
    }

    #[test]
    fn item_can_be_optional() {
        let b: BasicSpec = serde_yaml::from_str("type: vmci\nrequired: false\n").unwrap();
        assert!(!b.common.required);
    }
}
