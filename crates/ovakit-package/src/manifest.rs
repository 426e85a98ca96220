//! Manifest files: one `ALG(name)= hexdigest` line per covered file.

use crate::digest::HashAlgorithm;
use crate::PackageError;
use ovakit_core::write_artifact;
use rayon::prelude::*;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub algorithm: HashAlgorithm,
    /// Basename of the covered file.
    pub file_name: String,
    pub digest: String,
}

impl ManifestEntry {
    pub fn parse(line: &str, line_no: usize) -> Result<Self, PackageError> {
        let malformed = || PackageError::MalformedManifest {
            line: line_no,
            content: line.to_owned(),
        };
        let (head, digest) = line.split_once(")= ").ok_or_else(malformed)?;
        let (label, file_name) = head.split_once('(').ok_or_else(malformed)?;
        let algorithm = label.parse::<HashAlgorithm>()?;
        if !is_plain_file_name(file_name) || digest.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            algorithm,
            file_name: file_name.to_owned(),
            digest: digest.trim().to_owned(),
        })
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})= {}",
            self.algorithm.label(),
            self.file_name,
            self.digest
        )
    }
}

/// Manifest entries only ever name files beside the manifest.
fn is_plain_file_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && Path::new(name).file_name() == Some(OsStr::new(name))
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Hash every path in `paths`, in parallel, keeping input order.
pub fn build_manifest(
    algorithm: HashAlgorithm,
    paths: &[PathBuf],
) -> Result<Vec<ManifestEntry>, PackageError> {
    debug!("hashing {} files with {algorithm}", paths.len());
    paths
        .par_iter()
        .map(|path| -> Result<ManifestEntry, PackageError> {
            let digest = algorithm.hash_file(path)?;
            debug!("{} {digest}", path.display());
            Ok(ManifestEntry {
                algorithm,
                file_name: base_name(path),
                digest,
            })
        })
        .collect()
}

pub fn render_manifest(entries: &[ManifestEntry]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}

pub fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<(), PackageError> {
    write_artifact(path, render_manifest(entries).as_bytes())?;
    info!("wrote manifest {} ({} entries)", path.display(), entries.len());
    Ok(())
}

pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>, PackageError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| ManifestEntry::parse(line, i + 1))
        .collect()
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub passed: usize,
    pub failed: Vec<VerifyFailure>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct VerifyFailure {
    pub file_name: String,
    pub reason: String,
}

/// Re-hash every file listed in the manifest at `path`, resolving names
/// relative to the manifest's directory.
pub fn verify_manifest(path: &Path) -> Result<VerifyReport, PackageError> {
    let text = fs::read_to_string(path)?;
    let entries = parse_manifest(&text)?;
    let base = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let results: Vec<(String, Result<String, PackageError>)> = entries
        .par_iter()
        .map(|e| {
            (
                e.file_name.clone(),
                e.algorithm.hash_file(&base.join(&e.file_name)),
            )
        })
        .collect();

    let mut report = VerifyReport {
        checked: entries.len(),
        ..Default::default()
    };
    for (entry, (file_name, result)) in entries.iter().zip(results) {
        match result {
            Ok(actual) if actual.eq_ignore_ascii_case(&entry.digest) => report.passed += 1,
            Ok(actual) => report.failed.push(VerifyFailure {
                file_name,
                reason: format!("digest mismatch: expected {}, got {actual}", entry.digest),
            }),
            Err(e) => report.failed.push(VerifyFailure {
                file_name,
                reason: format!("read error: {e}"),
            }),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(dir: &Path) -> Vec<PathBuf> {
        let a = dir.join("vm.ovf");
        let b = dir.join("disk.vmdk");
        let c = dir.join("seed.iso");
        fs::write(&a, b"<Envelope/>").unwrap();
        fs::write(&b, vec![7u8; 100_000]).unwrap();
        fs::write(&c, b"iso").unwrap();
        vec![a, b, c]
    }

    #[test]
    fn lines_follow_input_order_and_use_basenames() {
        let dir = tempfile::tempdir().unwrap();
        let paths = files(dir.path());
        let entries = build_manifest(HashAlgorithm::Sha256, &paths).unwrap();
        let text = render_manifest(&entries);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SHA256(vm.ovf)= "));
        assert!(lines[1].starts_with("SHA256(disk.vmdk)= "));
        assert!(lines[2].starts_with("SHA256(seed.iso)= "));
        assert_eq!(
            lines[2],
            format!("SHA256(seed.iso)= {}", HashAlgorithm::Sha256.hash_bytes(b"iso"))
        );
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_manifest(HashAlgorithm::Sha1, &[dir.path().join("absent")]).unwrap_err();
        assert!(matches!(err, PackageError::Io(_)));
    }

    #[test]
    fn parse_accepts_rendered_output() {
        let text = "SHA512(a.ovf)= 00ff\nSHA512(b.vmdk)= aa11\n\n";
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].file_name, "b.vmdk");
        assert_eq!(entries[1].algorithm, HashAlgorithm::Sha512);
        assert_eq!(render_manifest(&entries), "SHA512(a.ovf)= 00ff\nSHA512(b.vmdk)= aa11\n");
    }

    #[test]
    fn parse_reports_line_number() {
        let err = parse_manifest("SHA1(a)= 00\ngarbage\n").unwrap_err();
        assert!(matches!(err, PackageError::MalformedManifest { line: 2, .. }));
    }

    #[test]
    fn names_outside_the_package_are_rejected() {
        for line in [
            "SHA256(../secret)= 00",
            "SHA256(/etc/passwd)= 00",
            "SHA256(sub/disk.vmdk)= 00",
            "SHA256(..)= 00",
            "SHA256(.)= 00",
            "SHA256(a\\b)= 00",
        ] {
            let err = ManifestEntry::parse(line, 1).unwrap_err();
            assert!(matches!(err, PackageError::MalformedManifest { .. }), "{line}");
        }
        assert!(ManifestEntry::parse("SHA256(..disk.vmdk)= 00", 1).is_ok());
    }

    #[test]
    fn verify_refuses_escaping_manifest() {
        let outer = tempfile::tempdir().unwrap();
        fs::write(outer.path().join("secret"), b"s").unwrap();
        let pkg = outer.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        let mf = pkg.join("vm.mf");
        fs::write(
            &mf,
            format!("SHA256(../secret)= {}\n", HashAlgorithm::Sha256.hash_bytes(b"s")),
        )
        .unwrap();
        let err = verify_manifest(&mf).unwrap_err();
        assert!(matches!(err, PackageError::MalformedManifest { line: 1, .. }));
    }

    #[test]
    fn verify_detects_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = files(dir.path());
        let entries = build_manifest(HashAlgorithm::Sha256, &paths[1..]).unwrap();
        let mf = dir.path().join("vm.mf");
        write_manifest(&mf, &entries).unwrap();

        let report = verify_manifest(&mf).unwrap();
        assert!(report.is_ok());
        assert_eq!(report.checked, 2);

        fs::write(&paths[2], b"tampered").unwrap();
        let report = verify_manifest(&mf).unwrap();
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file_name, "seed.iso");
    }

    #[test]
    fn verify_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mf = dir.path().join("vm.mf");
        fs::write(&mf, "SHA256(gone.vmdk)= 00\n").unwrap();
        let report = verify_manifest(&mf).unwrap();
        assert!(report.failed[0].reason.contains("read error"));
    }
}
