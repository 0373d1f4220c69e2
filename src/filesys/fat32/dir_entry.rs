//! FAT32 directory entry structure and operations

use super::boot_sector::{read_u16, read_u32};
use super::constants::*;
use alloc::string::String;
use bitflags::bitflags;

const ATTRIBUTES_OFFSET: usize = 11;
const CLUSTER_HIGH_OFFSET: usize = 20;
const CLUSTER_LOW_OFFSET: usize = 26;
const FILE_SIZE_OFFSET: usize = 28;

bitflags! {
    /// Directory entry attribute byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        /// All four low bits set marks a long filename fragment
        const LONG_NAME = 0x0F;
    }
}

/// 8.3 format directory entry (32 bytes on disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry83 {
    /// Space padded name and extension, case as stored
    pub name: [u8; SHORT_NAME_LENGTH],

    /// File attributes (read-only, directory, etc)
    pub attributes: Attributes,

    /// First cluster, joined from the high and low halves
    pub first_cluster: u32,

    /// File size in bytes
    pub file_size: u32,
}

impl DirEntry83 {
    /// Decodes the first 32 bytes of `raw`
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; SHORT_NAME_LENGTH];
        name.copy_from_slice(&raw[..SHORT_NAME_LENGTH]);

        let high = read_u16(raw, CLUSTER_HIGH_OFFSET) as u32;
        let low = read_u16(raw, CLUSTER_LOW_OFFSET) as u32;

        Self {
            name,
            attributes: Attributes::from_bits_retain(raw[ATTRIBUTES_OFFSET]),
            first_cluster: (high << 16) | low,
            file_size: read_u32(raw, FILE_SIZE_OFFSET),
        }
    }

    /// Encodes this entry into the first 32 bytes of `raw`
    pub fn write_to(&self, raw: &mut [u8]) {
        raw[..SHORT_NAME_LENGTH].copy_from_slice(&self.name);
        raw[ATTRIBUTES_OFFSET] = self.attributes.bits();
        raw[CLUSTER_HIGH_OFFSET..CLUSTER_HIGH_OFFSET + 2]
            .copy_from_slice(&((self.first_cluster >> 16) as u16).to_le_bytes());
        raw[CLUSTER_LOW_OFFSET..CLUSTER_LOW_OFFSET + 2]
            .copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        raw[FILE_SIZE_OFFSET..FILE_SIZE_OFFSET + 4].copy_from_slice(&self.file_size.to_le_bytes());
    }

    /// Returns true if entry is marked as deleted
    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_ENTRY_MARKER
    }

    /// Returns true if entry is unused; no entries follow it
    pub fn is_free(&self) -> bool {
        self.name[0] == END_OF_DIRECTORY_MARKER
    }

    /// Returns true if entry is a long filename fragment
    pub fn is_long_name(&self) -> bool {
        self.attributes.contains(Attributes::LONG_NAME)
    }

    /// Returns true if entry is a directory
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    /// Returns the filename as a string, including extension if present
    pub fn get_name(&self) -> String {
        let (name, ext) = self.name.split_at(MAX_FILENAME_LENGTH);
        let name_end = name.iter().rposition(|&x| x != 0x20).map_or(0, |i| i + 1);
        let ext_end = ext.iter().rposition(|&x| x != 0x20).map_or(0, |i| i + 1);

        let name = core::str::from_utf8(&name[..name_end]).unwrap_or("");
        let ext = core::str::from_utf8(&ext[..ext_end]).unwrap_or("");

        if ext_end > 0 {
            alloc::format!("{}.{}", name, ext)
        } else {
            name.into()
        }
    }
}

/// Converts a display name such as `hello.txt` into its padded, upper-case
/// on-disk form `HELLO   TXT`.
///
/// Returns `None` if either part is empty or too long, or for non-ASCII names.
pub fn short_name(display: &str) -> Option<[u8; SHORT_NAME_LENGTH]> {
    let (base, ext) = display.rsplit_once('.').unwrap_or((display, ""));
    if !display.is_ascii()
        || base.is_empty()
        || base.len() > MAX_FILENAME_LENGTH
        || ext.len() > MAX_EXTENSION_LENGTH
        || base.contains(|c: char| c == ' ' || c == '.')
        || ext.contains(' ')
    {
        return None;
    }

    let mut name = [0x20u8; SHORT_NAME_LENGTH];
    name[..base.len()].copy_from_slice(base.as_bytes());
    name[MAX_FILENAME_LENGTH..MAX_FILENAME_LENGTH + ext.len()].copy_from_slice(ext.as_bytes());
    name.make_ascii_uppercase();
    Some(name)
}
