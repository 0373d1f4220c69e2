//! FAT32 file handle

use super::{constants::SHORT_NAME_LENGTH, dir_entry::DirEntry83};

/// A file found in the root directory.
///
/// Holds no cursor and owns nothing on disk; copies can be passed to any
/// number of reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat32File {
    /// Entry point into the cluster chain
    pub first_cluster: u32,

    /// Total file size in bytes
    pub size: u32,

    /// Space padded 8.3 name as stored in the directory
    pub name: [u8; SHORT_NAME_LENGTH],
}

impl Fat32File {
    /// Returns the stored 8.3 name, or an empty string if it is not UTF-8
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name).unwrap_or("")
    }
}

impl From<&DirEntry83> for Fat32File {
    fn from(entry: &DirEntry83) -> Self {
        Self {
            first_cluster: entry.first_cluster,
            size: entry.file_size,
            name: entry.name,
        }
    }
}
