//! Manifest, signature, and package assembly for ovakit.
//!
//! Takes a resolved `VirtualMachine` and produces one of three artifacts: a
//! bare descriptor (optionally with manifest and certificate), an OVA tar
//! archive, or a directory. `Composer` drives the stages; each stage is
//! usable on its own.

pub mod archive;
pub mod compose;
pub mod digest;
pub mod manifest;
pub mod signal;
pub mod signing;
pub mod workspace;

pub use archive::{list_archive, write_archive, ArchiveEntry, TarFormat};
pub use compose::{ComposeOptions, ComposeReport, Composer, OutputFormat};
pub use digest::HashAlgorithm;
pub use manifest::{
    build_manifest, parse_manifest, render_manifest, verify_manifest, write_manifest,
    ManifestEntry, VerifyFailure, VerifyReport,
};
pub use signal::{install_signal_handler, shutdown_requested};
pub use signing::SigningStrategy;
pub use workspace::Workspace;

use ovakit_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("unsupported hash algorithm '{0}' (expected sha1, sha256, sha384 or sha512)")]
    UnsupportedAlgorithm(String),
    #[error("unsupported tar format '{0}' (expected gnu, ustar or v7)")]
    UnsupportedTarFormat(String),
    #[error("unsupported output format '{0}' (expected ovf, ova or dir)")]
    UnsupportedFormat(String),
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },
    #[error("no certificate found in {}", .0.display())]
    MissingCertificate(PathBuf),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("output already exists: {}", .0.display())]
    OutputExists(PathBuf),
    #[error("interrupted")]
    Interrupted,
    #[error("malformed manifest line {line}: '{content}'")]
    MalformedManifest { line: usize, content: String },
}

impl PackageError {
    /// True for errors caused by the input document or option values rather
    /// than by hashing, signing or archiving.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Core(
                CoreError::Config(_)
                    | CoreError::Entry { .. }
                    | CoreError::Validation(_)
                    | CoreError::Reference { .. }
                    | CoreError::UnsupportedKind { .. }
            ) | Self::UnsupportedAlgorithm(_)
                | Self::UnsupportedTarFormat(_)
                | Self::UnsupportedFormat(_)
                | Self::InvalidOptions(_)
        )
    }
}
