use core::fmt;
use core::result::Result;

pub mod block;
pub mod fat32;

/// Size of a disk sector in bytes
pub const SECTOR_SIZE: usize = 512;

// Define error types for the filesystem operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Boot sector is unreadable or describes an unsupported geometry
    InvalidBootSector,
    /// Name is not an 11-byte 8.3 name
    InvalidName,
    /// Cluster number outside the data region
    InvalidCluster,
    /// Buffer is not a whole number of sectors
    InvalidBuffer,
    /// Caller buffer cannot hold the file
    BufferTooSmall,
    NotFound,
    IOError,
    /// Cluster chain longer than any chain on a sane volume
    CorruptChain,
    /// Cluster chain ended before the file size was covered
    ChainExhausted,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidBootSector => write!(f, "Invalid boot sector"),
            FsError::InvalidName => write!(f, "Invalid 8.3 name"),
            FsError::InvalidCluster => write!(f, "Invalid cluster number"),
            FsError::InvalidBuffer => write!(f, "Buffer is not a whole number of sectors"),
            FsError::BufferTooSmall => write!(f, "Buffer too small"),
            FsError::NotFound => write!(f, "File not found"),
            FsError::IOError => write!(f, "Device I/O error"),
            FsError::CorruptChain => write!(f, "Cluster chain exceeds the iteration limit"),
            FsError::ChainExhausted => write!(f, "Cluster chain ended before end of file"),
        }
    }
}

/// Synchronous sector storage the filesystem is mounted on.
///
/// Transfers cover `buf.len() / sector_size()` consecutive sectors starting
/// at `lba`. On failure the contents of `buf` are unspecified.
pub trait BlockDevice: Send + Sync {
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), FsError>;
    fn write_sectors(&mut self, lba: u64, buf: &[u8]) -> Result<(), FsError>;
    fn total_sectors(&self) -> u64;

    fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }
}
