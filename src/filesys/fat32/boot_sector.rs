//! FAT32 BIOS Parameter Block

use super::constants::{FIRST_DATA_CLUSTER, MAX_BYTES_PER_SECTOR, MAX_SECTORS_PER_CLUSTER};
use crate::filesys::FsError;

const BYTES_PER_SECTOR_OFFSET: usize = 11;
const SECTORS_PER_CLUSTER_OFFSET: usize = 13;
const RESERVED_SECTORS_OFFSET: usize = 14;
const NUM_FATS_OFFSET: usize = 16;
const FAT_SIZE_OFFSET: usize = 36;
const ROOT_CLUSTER_OFFSET: usize = 44;
/// Bytes of sector 0 covered by the fields we read
const BPB_LENGTH: usize = 48;

/// Volume geometry read from sector 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiosParameterBlock {
    /// Number of bytes per sector
    pub bytes_per_sector: u16,

    /// Number of sectors per cluster
    pub sectors_per_cluster: u8,

    /// Number of reserved sectors at start of volume, including the boot sector
    pub reserved_sectors: u16,

    /// Number of FAT copies
    pub num_fats: u8,

    /// Size of each FAT copy in sectors
    pub fat_size_sectors: u32,

    /// First cluster of the root directory
    pub root_cluster: u32,
}

impl BiosParameterBlock {
    /// Parses and validates the BPB fields of a boot sector
    pub fn parse(sector: &[u8]) -> Result<Self, FsError> {
        if sector.len() < BPB_LENGTH {
            return Err(FsError::InvalidBootSector);
        }

        let bpb = Self {
            bytes_per_sector: read_u16(sector, BYTES_PER_SECTOR_OFFSET),
            sectors_per_cluster: sector[SECTORS_PER_CLUSTER_OFFSET],
            reserved_sectors: read_u16(sector, RESERVED_SECTORS_OFFSET),
            num_fats: sector[NUM_FATS_OFFSET],
            fat_size_sectors: read_u32(sector, FAT_SIZE_OFFSET),
            root_cluster: read_u32(sector, ROOT_CLUSTER_OFFSET),
        };
        bpb.validate()?;
        Ok(bpb)
    }

    fn validate(&self) -> Result<(), FsError> {
        let valid = (1..=MAX_BYTES_PER_SECTOR).contains(&self.bytes_per_sector)
            && (1..=MAX_SECTORS_PER_CLUSTER).contains(&self.sectors_per_cluster)
            && (1..=2).contains(&self.num_fats)
            && self.root_cluster >= FIRST_DATA_CLUSTER;

        if valid {
            Ok(())
        } else {
            Err(FsError::InvalidBootSector)
        }
    }

    /// First sector of the first FAT
    pub fn fat_start(&self) -> u64 {
        self.reserved_sectors as u64
    }

    /// First sector of cluster 2
    pub fn data_start(&self) -> u64 {
        self.fat_start() + self.num_fats as u64 * self.fat_size_sectors as u64
    }

    pub fn bytes_per_cluster(&self) -> usize {
        self.bytes_per_sector as usize * self.sectors_per_cluster as usize
    }

    /// Writes the fields back at their on-disk offsets
    pub fn write_to(&self, sector: &mut [u8]) {
        sector[BYTES_PER_SECTOR_OFFSET..BYTES_PER_SECTOR_OFFSET + 2]
            .copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        sector[SECTORS_PER_CLUSTER_OFFSET] = self.sectors_per_cluster;
        sector[RESERVED_SECTORS_OFFSET..RESERVED_SECTORS_OFFSET + 2]
            .copy_from_slice(&self.reserved_sectors.to_le_bytes());
        sector[NUM_FATS_OFFSET] = self.num_fats;
        sector[FAT_SIZE_OFFSET..FAT_SIZE_OFFSET + 4]
            .copy_from_slice(&self.fat_size_sectors.to_le_bytes());
        sector[ROOT_CLUSTER_OFFSET..ROOT_CLUSTER_OFFSET + 4]
            .copy_from_slice(&self.root_cluster.to_le_bytes());
    }
}

pub(super) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub(super) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
