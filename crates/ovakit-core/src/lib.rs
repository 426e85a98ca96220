//! Descriptor construction for ovakit.
//!
//! Builds the hardware item graph from a parsed `ConfigDocument`, resolves
//! controller and network references, gathers file and disk references
//! through a `DiskInspector`, and renders the resulting `VirtualMachine`
//! into an OVF envelope.

pub mod context;
pub mod descriptor;
pub mod disk;
pub mod graph;
pub mod hardware;
pub mod machine;
pub mod mock;
pub mod output;
pub mod references;
pub mod xml;

pub use context::ConversionContext;
pub use descriptor::{generation_banner, insert_banner, render, write_descriptor};
pub use disk::{prepare_disk_image, AllocationUnits, DiskInfo, DiskInspector, VmdkConvert};
pub use graph::HardwareGraph;
pub use hardware::{Attachment, Controller, EthernetAdapter, HardwareItem, HardwareKind, ItemDetail};
pub use machine::{
    Configuration, ExtraConfig, Network, ProductSection, Property, TextBlock, VirtualMachine,
};
pub use mock::MockInspector;
pub use output::{persist_artifact, temp_beside, write_artifact};
pub use references::{DiskBacking, DiskReference, FileReference};

use ovakit_schema::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid hardware entry '{id}': {source}")]
    Entry {
        id: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{referrer} references unknown {kind} '{id}'")]
    Reference {
        referrer: String,
        kind: &'static str,
        id: String,
    },
    #[error("hardware entry '{id}' has unsupported type '{kind}'")]
    UnsupportedKind { id: String, kind: String },
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },
    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid disk information: {0}")]
    DiskInfo(#[from] serde_json::Error),
    #[error("failed to render descriptor: {0}")]
    Render(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_error_names_both_sides() {
        let e = CoreError::Reference {
            referrer: "hardware entry 'rootdisk'".to_owned(),
            kind: "controller",
            id: "scsi9".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("rootdisk"));
        assert!(msg.contains("scsi9"));
        assert!(msg.contains("controller"));
    }

    #[test]
    fn unsupported_kind_names_tag() {
        let e = CoreError::UnsupportedKind {
            id: "gpu0".to_owned(),
            kind: "tensor_core".to_owned(),
        };
        assert!(e.to_string().contains("tensor_core"));
    }
}
