//! OVF envelope assembly.
//!
//! Section order is fixed: References, DiskSection, DeploymentOptionSection
//! (only with profiles), NetworkSection, then the VirtualSystem. Children of
//! each hardware item are sorted by qualified name so the output does not
//! depend on construction order.

use crate::hardware::{HardwareItem, ItemDetail};
use crate::machine::{Property, ProductSection, TextBlock, VirtualMachine};
use crate::references::{DiskBacking, DiskReference, FileReference};
use crate::xml::{write_document, Element};
use crate::output::write_artifact;
use crate::CoreError;
use chrono::{DateTime, Local};
use std::path::Path;
use tracing::info;

pub const TOOL_NAME: &str = "ovakit";

const NS_CIM: &str = "http://schemas.dmtf.org/wbem/wscim/1/common";
const NS_OVF: &str = "http://schemas.dmtf.org/ovf/envelope/1";
const NS_RASD: &str =
    "http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_ResourceAllocationSettingData";
const NS_VMW: &str = "http://www.vmware.com/schema/ovf";
const NS_VSSD: &str =
    "http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_VirtualSystemSettingData";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

const VMDK_FORMAT: &str = "http://www.vmware.com/interfaces/specifications/vmdk.html#streamOptimized";

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

fn rasd(tag: &str, value: impl Into<String>) -> Element {
    Element::text_element(format!("rasd:{tag}"), value)
}

fn vmw_config(key: &str, value: &str) -> Element {
    Element::new("vmw:Config")
        .with_attr("ovf:required", "false")
        .with_attr("vmw:key", key)
        .with_attr("vmw:value", value)
}

fn info(text: &str) -> Element {
    Element::text_element("Info", text)
}

fn file_element(file: &FileReference) -> Element {
    Element::new("File")
        .with_attr("ovf:href", file.file_name())
        .with_attr("ovf:id", file.id.as_str())
        .with_attr("ovf:size", file.size.to_string())
}

fn disk_element(disk: &DiskReference) -> Element {
    match &disk.backing {
        DiskBacking::File {
            file_id,
            populated_size,
        } => Element::new("Disk")
            .with_attr("ovf:diskId", disk.id.as_str())
            .with_attr("ovf:capacity", disk.capacity.to_string())
            .with_attr("ovf:capacityAllocationUnits", disk.units.as_str())
            .with_attr("ovf:fileRef", file_id.as_str())
            .with_attr("ovf:populatedSize", populated_size.to_string())
            .with_attr("ovf:format", VMDK_FORMAT),
        DiskBacking::Empty => Element::new("Disk")
            .with_attr("ovf:capacity", disk.capacity.to_string())
            .with_attr("ovf:capacityAllocationUnits", disk.units.as_str())
            .with_attr("ovf:diskId", disk.id.as_str())
            .with_attr("ovf:format", VMDK_FORMAT),
    }
}

fn system_element(vm: &VirtualMachine) -> Element {
    Element::new("System")
        .with_child(Element::text_element(
            "vssd:ElementName",
            "Virtual Hardware Family",
        ))
        .with_child(Element::text_element("vssd:InstanceID", "0"))
        .with_child(Element::text_element(
            "vssd:VirtualSystemIdentifier",
            vm.name.as_str(),
        ))
        .with_child(Element::text_element(
            "vssd:VirtualSystemType",
            vm.system_type.as_str(),
        ))
}

fn item_element(item: &HardwareItem) -> Element {
    let mut e = Element::new("Item");
    if !item.required {
        e.set_attr("ovf:required", "false");
    }
    if let Some(profile) = &item.configuration {
        e.set_attr("ovf:configuration", profile.as_str());
    }

    e.push(rasd("ResourceType", item.kind.resource_type().to_string()));
    e.push(rasd("InstanceID", item.instance_id.to_string()));
    e.push(rasd("Description", item.kind.description()));
    e.push(rasd("ElementName", item.id.as_str()));
    for (k, v) in &item.config {
        e.push(vmw_config(k, v));
    }
    if let Some(connected) = item.automatic_allocation() {
        e.push(rasd("AutomaticAllocation", bool_str(connected)));
    }
    if let Some(subtype) = item.resource_subtype() {
        e.push(rasd("ResourceSubType", subtype));
    }
    if let Some(link) = item.attachment().and_then(|a| a.link) {
        e.push(rasd("Parent", link.instance_id.to_string()));
        e.push(rasd("AddressOnParent", link.address.to_string()));
    }

    match &item.detail {
        ItemDetail::Cpu { count } => {
            e.push(rasd("AllocationUnits", "hertz * 10^6"));
            e.push(rasd("VirtualQuantity", count.to_string()));
        }
        ItemDetail::Memory { size_mib } => {
            e.push(rasd("AllocationUnits", "byte * 2^20"));
            e.push(rasd("VirtualQuantity", size_mib.to_string()));
        }
        ItemDetail::Floppy {
            image: Some(file_id),
            ..
        }
        | ItemDetail::CdDrive {
            image: Some(file_id),
            ..
        } => {
            e.push(rasd("HostResource", format!("ovf:/file/{file_id}")));
        }
        ItemDetail::HardDisk { disk, .. } => {
            e.push(rasd("HostResource", format!("ovf:/disk/{disk}")));
        }
        ItemDetail::Ethernet(eth) => {
            if let Some(connection) = &eth.connection {
                e.push(rasd("Connection", connection.as_str()));
            }
            if let Some(address) = &eth.address {
                e.push(rasd("Address", address.as_str()));
            }
        }
        _ => {}
    }

    e.sort_children();
    e
}

fn property_element(prop: &Property) -> Element {
    let mut e = Element::new("Property")
        .with_attr("ovf:key", prop.key.as_str())
        .with_attr("ovf:type", prop.property_type.as_str());
    if let Some(value) = &prop.value {
        e.set_attr("ovf:value", value.as_str());
    }
    if let Some(qualifiers) = &prop.qualifiers {
        e.set_attr("ovf:qualifiers", qualifiers.as_str());
    }
    if prop.user_configurable {
        e.set_attr("ovf:userConfigurable", "true");
    }
    if let Some(profile) = &prop.configuration {
        e.set_attr("ovf:configuration", profile.as_str());
    }
    if prop.password {
        e.set_attr("ovf:password", "true");
    }
    if let Some(required) = prop.required {
        e.set_attr("ovf:required", bool_str(required));
    }

    if let Some(label) = &prop.label {
        e.push(Element::text_element("Label", label.as_str()));
    }
    if let Some(description) = &prop.description {
        e.push(Element::text_element("Description", description.as_str()));
    }
    for (profile, value) in &prop.profile_values {
        e.push(
            Element::new("Value")
                .with_attr("ovf:value", value.as_str())
                .with_attr("ovf:configuration", profile.as_str()),
        );
    }
    e
}

fn product_element(product: &ProductSection) -> Element {
    let mut e = Element::new("ProductSection");
    if let Some(class) = &product.class_name {
        e.set_attr("ovf:class", class.as_str());
    }
    if let Some(instance) = &product.instance {
        e.set_attr("ovf:instance", instance.as_str());
    }
    if let Some(required) = product.required {
        e.set_attr("ovf:required", bool_str(required));
    }

    e.push(info(&product.info));
    let fields = [
        ("Product", &product.product),
        ("Vendor", &product.vendor),
        ("Version", &product.version),
        ("FullVersion", &product.full_version),
    ];
    for (tag, value) in fields {
        if let Some(value) = value {
            e.push(Element::text_element(tag, value.as_str()));
        }
    }

    for prop in product.properties_in(None) {
        e.push(property_element(prop));
    }
    for (id, label) in &product.categories {
        e.push(Element::text_element("Category", label.as_str()));
        for prop in product.properties_in(Some(id)) {
            e.push(property_element(prop));
        }
    }
    e
}

fn text_block_element(block: &TextBlock, section: &str, text_tag: &str) -> Element {
    let mut e = Element::new(section);
    e.push(info(&block.info));
    if let Some(text) = &block.text {
        e.push(Element::text_element(text_tag, text.as_str()));
    }
    e
}

/// Build the envelope element tree for `vm`.
pub fn build_envelope(vm: &VirtualMachine) -> Element {
    let mut envelope = Element::new("Envelope")
        .with_attr("xmlns", NS_OVF)
        .with_attr("xmlns:cim", NS_CIM)
        .with_attr("xmlns:ovf", NS_OVF)
        .with_attr("xmlns:rasd", NS_RASD)
        .with_attr("xmlns:vmw", NS_VMW)
        .with_attr("xmlns:vssd", NS_VSSD)
        .with_attr("xmlns:xsi", NS_XSI);

    let mut references = Element::new("References");
    for file in vm.files() {
        references.push(file_element(file));
    }
    envelope.push(references);

    let mut disks = Element::new("DiskSection").with_child(info("Virtual disk information"));
    for disk in vm.disks() {
        disks.push(disk_element(disk));
    }
    envelope.push(disks);

    if !vm.configurations.is_empty() {
        let mut options = Element::new("DeploymentOptionSection").with_child(info("List of profiles"));
        for config in &vm.configurations {
            let mut c = Element::new("Configuration").with_attr("ovf:id", config.id.as_str());
            if config.default {
                c.set_attr("ovf:default", "true");
            }
            c.push(Element::text_element("Label", config.label.as_str()));
            c.push(Element::text_element("Description", config.description.as_str()));
            options.push(c);
        }
        envelope.push(options);
    }

    let mut networks = Element::new("NetworkSection").with_child(info("Virtual Networks"));
    for network in vm.networks.values() {
        networks.push(
            Element::new("Network")
                .with_attr("ovf:name", network.name.as_str())
                .with_child(Element::text_element("Description", network.description())),
        );
    }
    envelope.push(networks);

    let mut system = Element::new("VirtualSystem")
        .with_attr("ovf:id", "vm")
        .with_child(info("Virtual System"))
        .with_child(Element::text_element("Name", vm.name.as_str()));

    let mut os = Element::new("OperatingSystemSection")
        .with_attr("ovf:id", vm.os_cim.to_string())
        .with_attr("vmw:osType", vm.os_vmw.as_str())
        .with_child(info("Operating System"));
    if let Some(os_name) = &vm.os_name {
        os.push(Element::text_element("Description", os_name.as_str()));
    }
    system.push(os);

    let mut hw = Element::new("VirtualHardwareSection");
    if let Some(transports) = vm.transports() {
        hw.set_attr("ovf:transport", transports);
    }
    hw.push(info("Virtual Hardware"));
    hw.push(system_element(vm));
    for item in vm.hardware.items() {
        hw.push(item_element(item));
    }
    for xc in &vm.extra_configs {
        let mut x = Element::new("vmw:ExtraConfig")
            .with_attr("vmw:key", xc.key.as_str())
            .with_attr("vmw:value", xc.value.as_str());
        if let Some(required) = xc.required {
            x.set_attr("ovf:required", bool_str(required));
        }
        hw.push(x);
    }
    for (k, v) in &vm.vendor_config {
        hw.push(vmw_config(k, v));
    }
    system.push(hw);

    for product in &vm.products {
        system.push(product_element(product));
    }
    if let Some(annotation) = &vm.annotation {
        system.push(text_block_element(annotation, "AnnotationSection", "Annotation"));
    }
    if let Some(eula) = &vm.eula {
        system.push(
            text_block_element(eula, "EulaSection", "License").with_attr("ovf:msgid", "eula"),
        );
    }
    envelope.push(system);

    envelope
}

/// Render the descriptor without the generation banner.
pub fn render(vm: &VirtualMachine) -> Result<String, CoreError> {
    write_document(&build_envelope(vm))
}

pub fn generation_banner(now: &DateTime<Local>) -> String {
    format!(
        "<!-- Generated by {TOOL_NAME} {} -->",
        now.format("%d-%m-%Y %H:%M:%S %z")
    )
}

/// Insert `banner` as the line right after the XML prolog.
pub fn insert_banner(xml: &str, banner: &str) -> String {
    match xml.split_once('\n') {
        Some((prolog, rest)) => format!("{prolog}\n{banner}\n{rest}"),
        None => format!("{xml}\n{banner}\n"),
    }
}

/// Render `vm` with a banner and write it atomically to `path`.
pub fn write_descriptor(vm: &VirtualMachine, path: &Path) -> Result<(), CoreError> {
    let xml = insert_banner(&render(vm)?, &generation_banner(&Local::now()));

    write_artifact(path, xml.as_bytes())?;

    info!("wrote descriptor {}", path.display());
    Ok(())
}
