use crate::CoreError;
use ovakit_schema::{DiskId, FileId, HardwareId, NetworkId, ProfileId};
use std::collections::BTreeMap;

/// Closed set of hardware kinds a `hardware` entry can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareKind {
    Cpu,
    Memory,
    ScsiController,
    SataController,
    NvmeController,
    IdeController,
    UsbController,
    Usb3Controller,
    Vmci,
    Floppy,
    VideoCard,
    CdDrive,
    HardDisk,
    Ethernet,
}

const GUEST_CONTROL: &[(&str, &str)] = &[("connectable.allowGuestControl", "true")];
const ETHERNET_DEFAULTS: &[(&str, &str)] = &[
    ("connectable.allowGuestControl", "true"),
    ("wakeOnLanEnabled", "false"),
];
const VIDEO_DEFAULTS: &[(&str, &str)] = &[
    ("enable3DSupport", "false"),
    ("use3dRenderer", "automatic"),
    ("useAutoDetect", "false"),
    ("videoRamSizeInKB", "4096"),
];
const USB_DEFAULTS: &[(&str, &str)] = &[("ehciEnabled", "true")];

impl HardwareKind {
    /// Map a `type:` tag to a kind. Tags are case-insensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag.to_ascii_lowercase().as_str() {
            "cpus" => Self::Cpu,
            "memory" => Self::Memory,
            "scsi_controller" => Self::ScsiController,
            "sata_controller" => Self::SataController,
            "nvme_controller" => Self::NvmeController,
            "ide_controller" => Self::IdeController,
            "usb_controller" => Self::UsbController,
            "usb3_controller" => Self::Usb3Controller,
            "vmci" => Self::Vmci,
            "floppy" => Self::Floppy,
            "video_card" => Self::VideoCard,
            "cd_drive" => Self::CdDrive,
            "hard_disk" => Self::HardDisk,
            "ethernet" => Self::Ethernet,
            _ => return None,
        };
        Some(kind)
    }

    /// Kind of the entry `id`. The ids `cpus` and `memory` are fixed; every
    /// other entry needs a `type` tag.
    pub fn resolve(id: &str, entry: &serde_yaml::Value) -> Result<Self, CoreError> {
        match id {
            "cpus" => return Ok(Self::Cpu),
            "memory" => return Ok(Self::Memory),
            _ => {}
        }
        let Some(tag) = entry.get("type") else {
            return Err(CoreError::Validation(format!(
                "hardware entry '{id}' has no 'type'"
            )));
        };
        let Some(tag) = tag.as_str() else {
            return Err(CoreError::Validation(format!(
                "hardware entry '{id}' has a non-string 'type'"
            )));
        };
        Self::from_tag(tag).ok_or_else(|| CoreError::UnsupportedKind {
            id: id.to_owned(),
            kind: tag.to_owned(),
        })
    }

    /// CIM resource type code (`rasd:ResourceType`).
    pub fn resource_type(self) -> u32 {
        match self {
            Self::Vmci => 1,
            Self::Cpu => 3,
            Self::Memory => 4,
            Self::IdeController => 5,
            Self::ScsiController => 6,
            Self::Ethernet => 10,
            Self::Floppy => 14,
            Self::CdDrive => 15,
            Self::HardDisk => 17,
            Self::SataController | Self::NvmeController => 20,
            Self::UsbController | Self::Usb3Controller => 23,
            Self::VideoCard => 24,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Cpu => "Virtual CPUs",
            Self::Memory => "Virtual Memory",
            Self::ScsiController => "SCSI Controller",
            Self::SataController => "SATA Controller",
            Self::NvmeController => "NVME Controller",
            Self::IdeController => "IDE Controller",
            Self::UsbController => "USB Controller",
            Self::Usb3Controller => "USB3 Controller",
            Self::Vmci => "VMCI",
            Self::Floppy => "Floppy Drive",
            Self::VideoCard => "Video Card",
            Self::CdDrive => "CD Drive",
            Self::HardDisk => "Hard Disk",
            Self::Ethernet => "Ethernet Adapter",
        }
    }

    /// Fixed `rasd:ResourceSubType`, for kinds that have one.
    fn fixed_subtype(self) -> Option<&'static str> {
        match self {
            Self::SataController => Some("vmware.sata.ahci"),
            Self::NvmeController => Some("vmware.nvme.controller"),
            Self::UsbController => Some("vmware.usb.ehci"),
            Self::Usb3Controller => Some("vmware.usb.xhci"),
            Self::Vmci => Some("vmware.vmci"),
            Self::CdDrive => Some("vmware.cdrom.remotepassthrough"),
            _ => None,
        }
    }

    /// Vendor config every item of this kind starts with.
    pub fn default_config(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::CdDrive | Self::Floppy => GUEST_CONTROL,
            Self::Ethernet => ETHERNET_DEFAULTS,
            Self::VideoCard => VIDEO_DEFAULTS,
            Self::UsbController => USB_DEFAULTS,
            _ => &[],
        }
    }

    pub fn is_controller(self) -> bool {
        matches!(
            self,
            Self::ScsiController | Self::SataController | Self::NvmeController | Self::IdeController
        )
    }
}

/// Attachment point for child devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controller {
    pub subtype: Option<String>,
    next_child_address: u32,
    children: Vec<usize>,
}

impl Controller {
    pub fn new(subtype: Option<String>) -> Self {
        Self {
            subtype,
            next_child_address: 0,
            children: Vec::new(),
        }
    }

    /// Register the item at `index` and hand out its address on this bus.
    pub fn add_child(&mut self, index: usize) -> u32 {
        let address = self.next_child_address;
        self.next_child_address += 1;
        self.children.push(index);
        address
    }

    /// Graph indices of attached devices, in attach order.
    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub index: usize,
    pub instance_id: u32,
    pub address: u32,
}

/// A device's reference to its controller, resolved by `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub parent_id: HardwareId,
    pub link: Option<ParentLink>,
}

impl Attachment {
    pub fn new(parent_id: impl Into<HardwareId>) -> Self {
        Self {
            parent_id: parent_id.into(),
            link: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetAdapter {
    pub network_id: NetworkId,
    pub subtype: String,
    pub connected: bool,
    pub address: Option<String>,
    /// Network name, resolved by `connect`.
    pub connection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemDetail {
    Cpu { count: u32 },
    Memory { size_mib: u64 },
    Controller(Controller),
    /// USB, USB3, VMCI and video card.
    Plain,
    Floppy { image: Option<FileId>, connected: bool },
    CdDrive {
        attachment: Attachment,
        image: Option<FileId>,
        connected: bool,
    },
    HardDisk { attachment: Attachment, disk: DiskId },
    Ethernet(EthernetAdapter),
}

/// One RASD item of the virtual hardware section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareItem {
    pub id: HardwareId,
    pub kind: HardwareKind,
    pub instance_id: u32,
    pub detail: ItemDetail,
    pub config: BTreeMap<String, String>,
    pub configuration: Option<ProfileId>,
    pub required: bool,
}

impl HardwareItem {
    pub fn resource_subtype(&self) -> Option<&str> {
        match &self.detail {
            ItemDetail::Controller(c) if c.subtype.is_some() => c.subtype.as_deref(),
            ItemDetail::Ethernet(eth) => Some(&eth.subtype),
            _ => self.kind.fixed_subtype(),
        }
    }

    /// `rasd:AutomaticAllocation`, present on connectable kinds only.
    pub fn automatic_allocation(&self) -> Option<bool> {
        match &self.detail {
            ItemDetail::Floppy { connected, .. } | ItemDetail::CdDrive { connected, .. } => {
                Some(*connected)
            }
            ItemDetail::Ethernet(eth) => Some(eth.connected),
            _ if self.kind == HardwareKind::VideoCard => Some(false),
            _ => None,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match &self.detail {
            ItemDetail::CdDrive { attachment, .. } | ItemDetail::HardDisk { attachment, .. } => {
                Some(attachment)
            }
            _ => None,
        }
    }

    pub fn attachment_mut(&mut self) -> Option<&mut Attachment> {
        match &mut self.detail {
            ItemDetail::CdDrive { attachment, .. } | ItemDetail::HardDisk { attachment, .. } => {
                Some(attachment)
            }
            _ => None,
        }
    }

    pub fn controller(&self) -> Option<&Controller> {
        match &self.detail {
            ItemDetail::Controller(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: HardwareKind, detail: ItemDetail) -> HardwareItem {
        HardwareItem {
            id: HardwareId::new("x"),
            kind,
            instance_id: 1,
            detail,
            config: BTreeMap::new(),
            configuration: None,
            required: true,
        }
    }

    #[test]
    fn tags_are_case_insensitive() {
        assert_eq!(
            HardwareKind::from_tag("SCSI_Controller"),
            Some(HardwareKind::ScsiController)
        );
        assert_eq!(HardwareKind::from_tag("usb3_controller"), Some(HardwareKind::Usb3Controller));
        assert_eq!(HardwareKind::from_tag("gpu"), None);
    }

    #[test]
    fn resolve_uses_fixed_ids() {
        let v: serde_yaml::Value = serde_yaml::from_str("2").unwrap();
        assert_eq!(HardwareKind::resolve("cpus", &v).unwrap(), HardwareKind::Cpu);
        assert_eq!(HardwareKind::resolve("memory", &v).unwrap(), HardwareKind::Memory);
    }

    #[test]
    fn resolve_rejects_unknown_tag() {
        let v: serde_yaml::Value = serde_yaml::from_str("type: sound_card").unwrap();
        match HardwareKind::resolve("audio", &v).unwrap_err() {
            CoreError::UnsupportedKind { id, kind } => {
                assert_eq!(id, "audio");
                assert_eq!(kind, "sound_card");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_requires_type() {
        let v: serde_yaml::Value = serde_yaml::from_str("parent: scsi0").unwrap();
        assert!(matches!(
            HardwareKind::resolve("disk", &v),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn resource_types_match_cim_codes() {
        assert_eq!(HardwareKind::Cpu.resource_type(), 3);
        assert_eq!(HardwareKind::NvmeController.resource_type(), 20);
        assert_eq!(HardwareKind::HardDisk.resource_type(), 17);
        assert_eq!(HardwareKind::VideoCard.resource_type(), 24);
    }

    #[test]
    fn controller_addresses_are_sequential() {
        let mut c = Controller::new(None);
        assert_eq!(c.add_child(4), 0);
        assert_eq!(c.add_child(7), 1);
        assert_eq!(c.children(), &[4, 7]);
    }

    #[test]
    fn subtype_sources() {
        let scsi = item(
            HardwareKind::ScsiController,
            ItemDetail::Controller(Controller::new(Some("lsilogic".into()))),
        );
        assert_eq!(scsi.resource_subtype(), Some("lsilogic"));

        let ide = item(
            HardwareKind::IdeController,
            ItemDetail::Controller(Controller::new(None)),
        );
        assert_eq!(ide.resource_subtype(), None);

        let sata = item(
            HardwareKind::SataController,
            ItemDetail::Controller(Controller::new(None)),
        );
        assert_eq!(sata.resource_subtype(), Some("vmware.sata.ahci"));
    }

    #[test]
    fn video_card_is_never_auto_allocated() {
        let video = item(HardwareKind::VideoCard, ItemDetail::Plain);
        assert_eq!(video.automatic_allocation(), Some(false));
        let vmci = item(HardwareKind::Vmci, ItemDetail::Plain);
        assert_eq!(vmci.automatic_allocation(), None);
    }
}
