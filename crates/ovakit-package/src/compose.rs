//! End-to-end packaging of a resolved virtual machine.

use crate::archive::{write_archive, ArchiveEntry, TarFormat};
use crate::digest::HashAlgorithm;
use crate::manifest::{build_manifest, write_manifest};
use crate::signal::check_interrupted;
use crate::signing::SigningStrategy;
use crate::workspace::Workspace;
use crate::PackageError;
use ovakit_core::output::parent_dir;
use ovakit_core::{write_descriptor, VirtualMachine};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Descriptor written in place, manifest and certificate beside it.
    Ovf,
    /// Single tar archive.
    Ova,
    /// Directory holding descriptor, manifest, certificate and payloads.
    Dir,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ovf => "ovf",
            Self::Ova => "ova",
            Self::Dir => "dir",
        }
    }

    /// Format implied by the output file extension.
    pub fn infer(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("ova") {
            Some(Self::Ova)
        } else if ext.eq_ignore_ascii_case("ovf") {
            Some(Self::Ovf)
        } else {
            None
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ovf" => Ok(Self::Ovf),
            "ova" => Ok(Self::Ova),
            "dir" => Ok(Self::Dir),
            _ => Err(PackageError::UnsupportedFormat(s.to_owned())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub output: PathBuf,
    /// Inferred from the output extension when unset.
    pub format: Option<OutputFormat>,
    /// Only consulted for `ovf`; the other formats always carry a manifest.
    pub manifest: bool,
    pub checksum: HashAlgorithm,
    pub sign_key: Option<PathBuf>,
    /// Defaults to `checksum`.
    pub sign_alg: Option<HashAlgorithm>,
    pub signer: SigningStrategy,
    pub tar_format: TarFormat,
}

impl ComposeOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            format: None,
            manifest: false,
            checksum: HashAlgorithm::default(),
            sign_key: None,
            sign_alg: None,
            signer: SigningStrategy::default(),
            tar_format: TarFormat::default(),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ComposeReport {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub descriptor: String,
    pub manifest: Option<String>,
    pub certificate: Option<String>,
    /// Payload file names, in declaration order.
    pub payloads: Vec<String>,
}

/// Validated packaging plan for one output.
#[derive(Debug)]
pub struct Composer {
    options: ComposeOptions,
    format: OutputFormat,
    basename: String,
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Composer {
    pub fn new(options: ComposeOptions) -> Result<Self, PackageError> {
        let format = match options.format {
            Some(f) => f,
            None => OutputFormat::infer(&options.output).ok_or_else(|| {
                PackageError::InvalidOptions(format!(
                    "cannot infer output format from '{}'; pass a format explicitly",
                    options.output.display()
                ))
            })?,
        };

        if format == OutputFormat::Ovf && options.sign_key.is_some() && !options.manifest {
            return Err(PackageError::InvalidOptions(
                "signing an ovf output requires a manifest".to_owned(),
            ));
        }

        let name = file_name_of(&options.output);
        if name.is_empty() {
            return Err(PackageError::InvalidOptions(format!(
                "output path '{}' has no file name",
                options.output.display()
            )));
        }
        let basename = match format {
            OutputFormat::Dir => name,
            OutputFormat::Ovf | OutputFormat::Ova => {
                let lower = name.to_ascii_lowercase();
                if lower.ends_with(".ovf") || lower.ends_with(".ova") {
                    name[..name.len() - 4].to_owned()
                } else {
                    name
                }
            }
        };

        Ok(Self {
            options,
            format,
            basename,
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    fn sign_alg(&self) -> HashAlgorithm {
        self.options.sign_alg.unwrap_or(self.options.checksum)
    }

    fn names(&self) -> (String, String, String) {
        (
            format!("{}.ovf", self.basename),
            format!("{}.mf", self.basename),
            format!("{}.cert", self.basename),
        )
    }

    pub fn compose(&self, vm: &VirtualMachine) -> Result<ComposeReport, PackageError> {
        info!(
            "composing '{}' as {} into {}",
            vm.name,
            self.format,
            self.options.output.display()
        );
        check_interrupted()?;
        match self.format {
            OutputFormat::Ovf => self.compose_ovf(vm),
            OutputFormat::Ova | OutputFormat::Dir => self.compose_packaged(vm),
        }
    }

    fn compose_ovf(&self, vm: &VirtualMachine) -> Result<ComposeReport, PackageError> {
        let mut created = Vec::new();
        let result = self.stage_ovf(vm, &mut created);
        if result.is_err() {
            for path in created.iter().rev().filter(|p| p.exists()) {
                if let Err(e) = fs::remove_file(path) {
                    warn!("failed to remove {}: {e}", path.display());
                }
            }
        }
        result
    }

    fn stage_ovf(
        &self,
        vm: &VirtualMachine,
        created: &mut Vec<PathBuf>,
    ) -> Result<ComposeReport, PackageError> {
        let descriptor = self.options.output.clone();
        let dir = parent_dir(&descriptor).to_path_buf();
        let (_, mf_name, cert_name) = self.names();

        write_descriptor(vm, &descriptor)?;
        created.push(descriptor.clone());

        let mut report = ComposeReport {
            output: descriptor.clone(),
            format: self.format,
            descriptor: file_name_of(&descriptor),
            manifest: None,
            certificate: None,
            payloads: vm.files().iter().map(|f| f.file_name()).collect(),
        };
        if !self.options.manifest {
            return Ok(report);
        }
        check_interrupted()?;

        let mut hashed = vec![descriptor];
        hashed.extend(vm.files().iter().map(|f| f.path.clone()));
        let entries = build_manifest(self.options.checksum, &hashed)?;
        let mf = dir.join(&mf_name);
        write_manifest(&mf, &entries)?;
        created.push(mf.clone());
        report.manifest = Some(mf_name);

        if let Some(key) = &self.options.sign_key {
            check_interrupted()?;
            let cert = dir.join(&cert_name);
            created.push(cert.clone());
            self.options.signer.sign(&mf, key, self.sign_alg(), &cert)?;
            report.certificate = Some(cert_name);
        }
        Ok(report)
    }

    fn compose_packaged(&self, vm: &VirtualMachine) -> Result<ComposeReport, PackageError> {
        let output = &self.options.output;
        let (ovf_name, mf_name, cert_name) = self.names();
        let ws = Workspace::create(parent_dir(output), &self.basename)?;

        let descriptor = ws.join(&ovf_name);
        write_descriptor(vm, &descriptor)?;
        check_interrupted()?;

        let mut members = vec![ArchiveEntry::new(ovf_name.clone(), descriptor.clone())];
        let mut payloads = Vec::new();
        for file in vm.files() {
            let link = ws.link_payload(file)?;
            payloads.push(ArchiveEntry::new(file.file_name(), link));
        }

        let mut hashed = vec![descriptor];
        hashed.extend(payloads.iter().map(|p| p.source.clone()));
        let entries = build_manifest(self.options.checksum, &hashed)?;
        let mf = ws.join(&mf_name);
        write_manifest(&mf, &entries)?;
        members.push(ArchiveEntry::new(mf_name.clone(), mf.clone()));
        check_interrupted()?;

        let payload_names: Vec<String> = payloads.iter().map(|p| p.name.clone()).collect();
        members.extend(payloads);

        let certificate = match &self.options.sign_key {
            Some(key) => {
                let cert = ws.join(&cert_name);
                self.options.signer.sign(&mf, key, self.sign_alg(), &cert)?;
                members.push(ArchiveEntry::new(cert_name.clone(), cert));
                check_interrupted()?;
                Some(cert_name)
            }
            None => None,
        };

        if self.format == OutputFormat::Dir {
            ws.commit_dir(output)?;
            info!("wrote directory {}", output.display());
        } else {
            write_archive(output, &members, self.options.tar_format)?;
        }

        Ok(ComposeReport {
            output: output.clone(),
            format: self.format,
            descriptor: ovf_name,
            manifest: Some(mf_name),
            certificate,
            payloads: payload_names,
        })
    }
}
