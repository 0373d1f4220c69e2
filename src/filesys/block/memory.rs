//! In-memory block device implementation

use crate::filesys::{BlockDevice, FsError, SECTOR_SIZE};
use alloc::vec;
use alloc::vec::Vec;
use core::result::Result;

/// Block device that stores its sectors in memory
pub struct MemoryBlockDevice {
    /// Sector contents, back to back
    data: Vec<u8>,
}

impl MemoryBlockDevice {
    /// Creates a zero-filled device with `total_sectors` sectors
    pub fn new(total_sectors: u64) -> Self {
        Self {
            data: vec![0; total_sectors as usize * SECTOR_SIZE],
        }
    }

    /// Wraps a raw disk image. A trailing partial sector is zero padded.
    pub fn from_image(mut image: Vec<u8>) -> Self {
        let padded = image.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        image.resize(padded, 0);
        Self { data: image }
    }

    /// Returns the raw image
    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    /// Byte range of a `len`-byte transfer starting at sector `lba`
    fn span(&self, lba: u64, len: usize) -> Result<core::ops::Range<usize>, FsError> {
        if len == 0 || len % SECTOR_SIZE != 0 {
            return Err(FsError::InvalidBuffer);
        }
        let start = usize::try_from(lba)
            .ok()
            .and_then(|lba| lba.checked_mul(SECTOR_SIZE))
            .ok_or(FsError::IOError)?;
        let end = start.checked_add(len).ok_or(FsError::IOError)?;
        if end > self.data.len() {
            return Err(FsError::IOError);
        }
        Ok(start..end)
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), FsError> {
        let span = self.span(lba, buf.len())?;
        buf.copy_from_slice(&self.data[span]);
        Ok(())
    }

    fn write_sectors(&mut self, lba: u64, buf: &[u8]) -> Result<(), FsError> {
        let span = self.span(lba, buf.len())?;
        self.data[span].copy_from_slice(buf);
        Ok(())
    }

    fn total_sectors(&self) -> u64 {
        (self.data.len() / SECTOR_SIZE) as u64
    }
}
