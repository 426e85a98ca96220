//! Deterministic tar assembly for OVA packages.

use crate::PackageError;
use ovakit_core::{persist_artifact, temp_beside};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

const ENTRY_MODE: u32 = 0o644;

/// Tar header dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TarFormat {
    #[default]
    Gnu,
    Ustar,
    V7,
}

impl TarFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Gnu => "gnu",
            Self::Ustar => "ustar",
            Self::V7 => "v7",
        }
    }

    fn header(self) -> tar::Header {
        match self {
            Self::Gnu => tar::Header::new_gnu(),
            Self::Ustar => tar::Header::new_ustar(),
            Self::V7 => tar::Header::new_old(),
        }
    }
}

impl FromStr for TarFormat {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gnu" => Ok(Self::Gnu),
            "ustar" | "posix" => Ok(Self::Ustar),
            "v7" => Ok(Self::V7),
            _ => Err(PackageError::UnsupportedTarFormat(s.to_owned())),
        }
    }
}

impl fmt::Display for TarFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One archive member: the name inside the archive and the file to read.
/// Symlinks are followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub source: PathBuf,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

fn append_entry<W: Write>(
    ar: &mut tar::Builder<W>,
    format: TarFormat,
    entry: &ArchiveEntry,
) -> Result<(), PackageError> {
    let file = File::open(&entry.source)?;
    let size = file.metadata()?.len();
    let mut header = format.header();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(ENTRY_MODE);
    header.set_size(size);
    header.set_cksum();
    ar.append_data(&mut header, &entry.name, file)?;
    debug!("archived {} ({size} bytes)", entry.name);
    Ok(())
}

/// Write `entries` in order into a tar at `dest`.
///
/// The archive is built next to `dest` and renamed into place, so a failed
/// run never leaves a partial file behind.
pub fn write_archive(
    dest: &Path,
    entries: &[ArchiveEntry],
    format: TarFormat,
) -> Result<(), PackageError> {
    let tmp = temp_beside(dest)?;

    let mut ar = tar::Builder::new(tmp);
    ar.follow_symlinks(true);
    for entry in entries {
        append_entry(&mut ar, format, entry)?;
    }
    persist_artifact(ar.into_inner()?, dest)?;

    info!(
        "wrote {} archive {} ({} entries)",
        format,
        dest.display(),
        entries.len()
    );
    Ok(())
}

/// Names of the members of the archive at `path`, in order.
pub fn list_archive(path: &Path) -> Result<Vec<String>, PackageError> {
    let mut ar = tar::Archive::new(fs::File::open(path)?);
    let mut names = Vec::new();
    for entry in ar.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}
