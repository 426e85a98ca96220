use ovakit_schema::{DiskId, FileId};

/// Identifier sequences for one conversion.
///
/// Instance ids start at 1; file and disk ids are `file0, file1, ...` and
/// `vmdisk0, vmdisk1, ...`. A fresh context is created for every conversion
/// so repeated conversions in one process number identically.
#[derive(Debug, Default)]
pub struct ConversionContext {
    last_instance_id: u32,
    next_file: u32,
    next_disk: u32,
}

impl ConversionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_instance_id(&mut self) -> u32 {
        self.last_instance_id += 1;
        self.last_instance_id
    }

    pub fn next_file_id(&mut self) -> FileId {
        let id = FileId::new(format!("file{}", self.next_file));
        self.next_file += 1;
        id
    }

    pub fn next_disk_id(&mut self) -> DiskId {
        let id = DiskId::new(format!("vmdisk{}", self.next_disk));
        self.next_disk += 1;
        id
    }
}
