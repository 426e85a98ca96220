//! Hardware item graph: typed items in an arena, cross-referenced by index.
//!
//! Construction runs in two phases. Every entry is parsed and validated
//! first, with no I/O; then file and disk references are materialized and
//! instance ids handed out in declaration order. `connect` resolves parent
//! controllers and networks once all items exist, so an entry may refer to
//! one declared after it.

use crate::context::ConversionContext;
use crate::disk::{prepare_disk_image, AllocationUnits, DiskInspector};
use crate::hardware::{
    Attachment, Controller, EthernetAdapter, HardwareItem, HardwareKind, ItemDetail, ParentLink,
};
use crate::machine::Network;
use crate::references::{DiskBacking, DiskReference, FileReference};
use crate::CoreError;
use ovakit_schema::{
    BasicSpec, CdDriveSpec, ControllerSpec, CpuSpec, DiskId, EthernetSpec, FileId, FloppySpec,
    HardDiskSpec, HardwareId, ItemCommon, MemorySpec, NetworkId, OrderedMap, ProfileId,
};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCSI_SUBTYPES: &[&str] = &["virtualscsi", "lsilogic"];
const DEFAULT_SCSI_SUBTYPE: &str = "VirtualSCSI";

#[derive(Debug, Default)]
pub struct HardwareGraph {
    items: Vec<HardwareItem>,
    index: HashMap<HardwareId, usize>,
    files: Vec<FileReference>,
    disks: Vec<DiskReference>,
    connected: bool,
}

/// An entry after parsing, before any I/O.
enum ParsedEntry {
    Cpu(CpuSpec),
    Memory(MemorySpec),
    Controller(HardwareKind, Option<String>, ItemCommon),
    Plain(HardwareKind, ItemCommon),
    Floppy(FloppySpec),
    CdDrive(CdDriveSpec),
    HardDisk(HardDiskSpec, DiskSource),
    Ethernet(EthernetSpec),
}

enum DiskSource {
    Image {
        prepared: PathBuf,
        raw: Option<PathBuf>,
        units: AllocationUnits,
    },
    Empty {
        capacity: u64,
        units: AllocationUnits,
    },
}

fn parse_as<T: DeserializeOwned>(id: &str, value: &serde_yaml::Value) -> Result<T, CoreError> {
    serde_yaml::from_value(value.clone()).map_err(|source| CoreError::Entry {
        id: id.to_owned(),
        source,
    })
}

fn parse_units(raw: Option<&str>, default: AllocationUnits) -> Result<AllocationUnits, CoreError> {
    raw.map_or(Ok(default), str::parse)
}

fn scsi_subtype(id: &str, subtype: Option<String>) -> Result<String, CoreError> {
    match subtype {
        None => Ok(DEFAULT_SCSI_SUBTYPE.to_owned()),
        Some(s) if SCSI_SUBTYPES.contains(&s.to_ascii_lowercase().as_str()) => Ok(s),
        Some(s) => Err(CoreError::Validation(format!(
            "invalid SCSI subtype '{s}' for '{id}' (expected VirtualSCSI or lsilogic)"
        ))),
    }
}

impl ParsedEntry {
    fn parse(id: &str, value: &serde_yaml::Value) -> Result<Self, CoreError> {
        let kind = HardwareKind::resolve(id, value)?;
        let entry = match kind {
            HardwareKind::Cpu => Self::Cpu(parse_as(id, value)?),
            HardwareKind::Memory => Self::Memory(parse_as(id, value)?),
            HardwareKind::ScsiController => {
                let spec: ControllerSpec = parse_as(id, value)?;
                let subtype = scsi_subtype(id, spec.subtype)?;
                Self::Controller(kind, Some(subtype), spec.common)
            }
            HardwareKind::SataController
            | HardwareKind::NvmeController
            | HardwareKind::IdeController => {
                let spec: ControllerSpec = parse_as(id, value)?;
                Self::Controller(kind, None, spec.common)
            }
            HardwareKind::UsbController
            | HardwareKind::Usb3Controller
            | HardwareKind::Vmci
            | HardwareKind::VideoCard => {
                let spec: BasicSpec = parse_as(id, value)?;
                Self::Plain(kind, spec.common)
            }
            HardwareKind::Floppy => Self::Floppy(parse_as(id, value)?),
            HardwareKind::CdDrive => Self::CdDrive(parse_as(id, value)?),
            HardwareKind::HardDisk => {
                let spec: HardDiskSpec = parse_as(id, value)?;
                let source = disk_source(id, &spec)?;
                Self::HardDisk(spec, source)
            }
            HardwareKind::Ethernet => Self::Ethernet(parse_as(id, value)?),
        };
        Ok(entry)
    }
}

fn disk_source(id: &str, spec: &HardDiskSpec) -> Result<DiskSource, CoreError> {
    let units = spec.units.as_deref();
    if let Some(prepared) = &spec.disk_image {
        return Ok(DiskSource::Image {
            prepared: prepared.clone(),
            raw: spec.raw_image.clone(),
            units: parse_units(units, AllocationUnits::Byte)?,
        });
    }
    if let Some(raw) = &spec.raw_image {
        return Ok(DiskSource::Image {
            prepared: raw.with_extension("vmdk"),
            raw: Some(raw.clone()),
            units: parse_units(units, AllocationUnits::Byte)?,
        });
    }
    if let Some(capacity) = spec.disk_capacity {
        return Ok(DiskSource::Empty {
            capacity,
            units: parse_units(units, AllocationUnits::MiB)?,
        });
    }
    Err(CoreError::Validation(format!(
        "hard disk '{id}' needs one of 'disk_image', 'raw_image' or 'disk_capacity'"
    )))
}

fn merged_config(kind: HardwareKind, common: &ItemCommon) -> BTreeMap<String, String> {
    let mut config: BTreeMap<String, String> = kind
        .default_config()
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    for (k, v) in &common.config {
        config.insert(k.clone(), v.to_string());
    }
    config
}

impl HardwareGraph {
    /// Build the graph from the ordered `hardware` section.
    pub fn construct(
        hardware: &OrderedMap<String, serde_yaml::Value>,
        ctx: &mut ConversionContext,
        inspector: &dyn DiskInspector,
    ) -> Result<Self, CoreError> {
        let parsed = hardware
            .iter()
            .map(|(id, value)| ParsedEntry::parse(id, value).map(|entry| (id.as_str(), entry)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut graph = Self::default();
        for (id, entry) in parsed {
            let item = graph.materialize(id, entry, ctx, inspector)?;
            graph.index.insert(item.id.clone(), graph.items.len());
            graph.items.push(item);
        }

        debug!(
            "constructed {} hardware items, {} files, {} disks",
            graph.items.len(),
            graph.files.len(),
            graph.disks.len()
        );
        Ok(graph)
    }

    fn materialize(
        &mut self,
        id: &str,
        entry: ParsedEntry,
        ctx: &mut ConversionContext,
        inspector: &dyn DiskInspector,
    ) -> Result<HardwareItem, CoreError> {
        let (kind, detail, common) = match entry {
            ParsedEntry::Cpu(spec) => (
                HardwareKind::Cpu,
                ItemDetail::Cpu { count: spec.number },
                spec.common,
            ),
            ParsedEntry::Memory(spec) => (
                HardwareKind::Memory,
                ItemDetail::Memory {
                    size_mib: spec.size,
                },
                spec.common,
            ),
            ParsedEntry::Controller(kind, subtype, common) => (
                kind,
                ItemDetail::Controller(Controller::new(subtype)),
                common,
            ),
            ParsedEntry::Plain(kind, common) => (kind, ItemDetail::Plain, common),
            ParsedEntry::Floppy(spec) => {
                let image = self.add_image(spec.image.as_deref(), spec.file_id, ctx)?;
                (
                    HardwareKind::Floppy,
                    ItemDetail::Floppy {
                        image,
                        connected: spec.connected,
                    },
                    spec.common,
                )
            }
            ParsedEntry::CdDrive(spec) => {
                let image = self.add_image(spec.image.as_deref(), spec.file_id, ctx)?;
                (
                    HardwareKind::CdDrive,
                    ItemDetail::CdDrive {
                        attachment: Attachment::new(spec.parent),
                        image,
                        connected: spec.connected,
                    },
                    spec.common,
                )
            }
            ParsedEntry::HardDisk(spec, source) => {
                let disk = self.add_disk(source, spec.disk_id, spec.file_id, ctx, inspector)?;
                (
                    HardwareKind::HardDisk,
                    ItemDetail::HardDisk {
                        attachment: Attachment::new(spec.parent),
                        disk,
                    },
                    spec.common,
                )
            }
            ParsedEntry::Ethernet(spec) => (
                HardwareKind::Ethernet,
                ItemDetail::Ethernet(EthernetAdapter {
                    network_id: NetworkId::new(spec.network),
                    subtype: spec.subtype,
                    connected: spec.connected,
                    address: spec.address,
                    connection: None,
                }),
                spec.common,
            ),
        };

        Ok(HardwareItem {
            id: HardwareId::new(id),
            kind,
            instance_id: ctx.next_instance_id(),
            config: merged_config(kind, &common),
            configuration: common.configuration.map(ProfileId::new),
            required: common.required,
            detail,
        })
    }

    fn add_image(
        &mut self,
        image: Option<&Path>,
        file_id: Option<String>,
        ctx: &mut ConversionContext,
    ) -> Result<Option<FileId>, CoreError> {
        let Some(path) = image else {
            return Ok(None);
        };
        let id = file_id.map_or_else(|| ctx.next_file_id(), FileId::new);
        let file = FileReference::from_path(path, id.clone())?;
        self.files.push(file);
        Ok(Some(id))
    }

    fn add_disk(
        &mut self,
        source: DiskSource,
        disk_id: Option<String>,
        file_id: Option<String>,
        ctx: &mut ConversionContext,
        inspector: &dyn DiskInspector,
    ) -> Result<DiskId, CoreError> {
        let id = disk_id.map_or_else(|| ctx.next_disk_id(), DiskId::new);
        let disk = match source {
            DiskSource::Image {
                prepared,
                raw,
                units,
            } => {
                if let Some(raw) = &raw {
                    prepare_disk_image(inspector, raw, &prepared)?;
                }
                let file_id = file_id.map_or_else(|| ctx.next_file_id(), FileId::new);
                let file = FileReference::from_path(&prepared, file_id.clone())?;
                let info = inspector.inspect(&file.path)?;
                self.files.push(file);
                DiskReference {
                    id: id.clone(),
                    capacity: units.whole_units(info.capacity),
                    units,
                    backing: DiskBacking::File {
                        file_id,
                        populated_size: info.used,
                    },
                }
            }
            DiskSource::Empty { capacity, units } => DiskReference {
                id: id.clone(),
                capacity,
                units,
                backing: DiskBacking::Empty,
            },
        };
        self.disks.push(disk);
        Ok(id)
    }

    /// Resolve controller and network references.
    ///
    /// Devices are attached in declaration order, so addresses on each
    /// controller follow the order its devices were declared.
    pub fn connect(&mut self, networks: &OrderedMap<NetworkId, Network>) -> Result<(), CoreError> {
        if self.connected {
            return Ok(());
        }
        for child in 0..self.items.len() {
            if let Some(parent_id) = self.items[child].attachment().map(|a| a.parent_id.clone()) {
                let link = self.attach(child, &parent_id)?;
                if let Some(attachment) = self.items[child].attachment_mut() {
                    attachment.link = Some(link);
                }
            }

            let referrer = self.items[child].id.clone();
            if let ItemDetail::Ethernet(eth) = &mut self.items[child].detail {
                let network = networks
                    .get(&eth.network_id)
                    .ok_or_else(|| CoreError::Reference {
                        referrer: format!("hardware entry '{referrer}'"),
                        kind: "network",
                        id: eth.network_id.to_string(),
                    })?;
                eth.connection = Some(network.name.clone());
            }
        }
        self.connected = true;
        Ok(())
    }

    fn attach(&mut self, child: usize, parent_id: &HardwareId) -> Result<ParentLink, CoreError> {
        let referrer = format!("hardware entry '{}'", self.items[child].id);
        let Some(&index) = self.index.get(parent_id) else {
            return Err(CoreError::Reference {
                referrer,
                kind: "controller",
                id: parent_id.to_string(),
            });
        };
        let parent = &mut self.items[index];
        let instance_id = parent.instance_id;
        let ItemDetail::Controller(controller) = &mut parent.detail else {
            return Err(CoreError::Validation(format!(
                "{referrer} is attached to '{parent_id}', which is not a controller"
            )));
        };
        let address = controller.add_child(child);
        Ok(ParentLink {
            index,
            instance_id,
            address,
        })
    }

    pub fn items(&self) -> &[HardwareItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&HardwareItem> {
        self.index
            .get(&HardwareId::new(id))
            .map(|&i| &self.items[i])
    }

    pub fn files(&self) -> &[FileReference] {
        &self.files
    }

    pub fn disks(&self) -> &[DiskReference] {
        &self.disks
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
