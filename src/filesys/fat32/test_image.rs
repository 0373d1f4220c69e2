//! Synthetic FAT32 volumes for tests

use super::constants::{DIR_ENTRY_SIZE, END_OF_CHAIN, FAT_ENTRY_SIZE, FIRST_DATA_CLUSTER};
use super::{Attributes, BiosParameterBlock, DirEntry83, Fat32};
use crate::filesys::block::MemoryBlockDevice;
use crate::filesys::{BlockDevice, FsError, SECTOR_SIZE};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

/// Lays out a volume image in memory. The root directory starts empty at
/// cluster 2, terminated in the FAT.
pub struct VolumeBuilder {
    bpb: BiosParameterBlock,
    image: Vec<u8>,
}

impl VolumeBuilder {
    /// One sector per cluster, 4 reserved sectors, two single-sector FATs
    pub fn small() -> Self {
        Self::with_geometry(1, 4, 2, 1, 64)
    }

    pub fn with_geometry(
        sectors_per_cluster: u8,
        reserved_sectors: u16,
        num_fats: u8,
        fat_size_sectors: u32,
        data_clusters: u32,
    ) -> Self {
        let bpb = BiosParameterBlock {
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            fat_size_sectors,
            root_cluster: FIRST_DATA_CLUSTER,
        };
        let total_sectors = bpb.data_start() + data_clusters as u64 * sectors_per_cluster as u64;

        let mut builder = Self {
            bpb,
            image: vec![0u8; total_sectors as usize * SECTOR_SIZE],
        };
        bpb.write_to(&mut builder.image[..SECTOR_SIZE]);
        builder.set_fat(bpb.root_cluster, END_OF_CHAIN);
        builder
    }

    pub fn bpb(&self) -> BiosParameterBlock {
        self.bpb
    }

    /// Rewrites the sector size field without changing the layout
    pub fn patch_bytes_per_sector(&mut self, bytes_per_sector: u16) -> &mut Self {
        self.image[11..13].copy_from_slice(&bytes_per_sector.to_le_bytes());
        self
    }

    /// Stores a raw 32-bit entry for `cluster` in every FAT copy
    pub fn set_fat(&mut self, cluster: u32, raw: u32) -> &mut Self {
        for copy in 0..self.bpb.num_fats as u64 {
            let fat = self.bpb.fat_start() + copy * self.bpb.fat_size_sectors as u64;
            let offset = fat as usize * SECTOR_SIZE + cluster as usize * FAT_ENTRY_SIZE;
            self.image[offset..offset + FAT_ENTRY_SIZE].copy_from_slice(&raw.to_le_bytes());
        }
        self
    }

    /// Links `clusters` in order and terminates the chain after the last one
    pub fn chain(&mut self, clusters: &[u32]) -> &mut Self {
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.set_fat(last, END_OF_CHAIN);
        }
        self
    }

    fn cluster_offset(&self, cluster: u32) -> usize {
        let lba = self.bpb.data_start()
            + (cluster - FIRST_DATA_CLUSTER) as u64 * self.bpb.sectors_per_cluster as u64;
        lba as usize * SECTOR_SIZE
    }

    /// Writes directory entry number `index` of the directory cluster `cluster`
    pub fn dir_entry(
        &mut self,
        cluster: u32,
        index: usize,
        name: &[u8; 11],
        attributes: u8,
        first_cluster: u32,
        file_size: u32,
    ) -> &mut Self {
        let entry = DirEntry83 {
            name: *name,
            attributes: Attributes::from_bits_retain(attributes),
            first_cluster,
            file_size,
        };
        let offset = self.cluster_offset(cluster) + index * DIR_ENTRY_SIZE;
        entry.write_to(&mut self.image[offset..offset + DIR_ENTRY_SIZE]);
        self
    }

    /// Copies `bytes` to the start of `cluster`
    pub fn fill_cluster(&mut self, cluster: u32, bytes: &[u8]) -> &mut Self {
        assert!(bytes.len() <= self.bpb.bytes_per_cluster());
        let offset = self.cluster_offset(cluster);
        self.image[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn build(&self) -> MemoryBlockDevice {
        MemoryBlockDevice::from_image(self.image.clone())
    }

    pub fn try_mount(&self) -> Result<Fat32<'static>, FsError> {
        Fat32::mount(Box::new(self.build()))
    }

    pub fn mount(&self) -> Fat32<'static> {
        self.try_mount().expect("test volume should mount")
    }
}

/// Memory device that fails every transfer touching one sector
pub struct FailingDevice {
    inner: MemoryBlockDevice,
    failing_lba: u64,
    fail_writes: bool,
}

impl FailingDevice {
    /// Reads of `failing_lba` fail; writes go through
    pub fn failing_reads(inner: MemoryBlockDevice, failing_lba: u64) -> Self {
        Self {
            inner,
            failing_lba,
            fail_writes: false,
        }
    }

    /// Writes to `failing_lba` fail; reads go through
    pub fn failing_writes(inner: MemoryBlockDevice, failing_lba: u64) -> Self {
        Self {
            inner,
            failing_lba,
            fail_writes: true,
        }
    }

    fn covers(&self, lba: u64, len: usize) -> bool {
        let sectors = (len / SECTOR_SIZE) as u64;
        (lba..lba + sectors).contains(&self.failing_lba)
    }
}

impl BlockDevice for FailingDevice {
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), FsError> {
        if !self.fail_writes && self.covers(lba, buf.len()) {
            return Err(FsError::IOError);
        }
        self.inner.read_sectors(lba, buf)
    }

    fn write_sectors(&mut self, lba: u64, buf: &[u8]) -> Result<(), FsError> {
        if self.fail_writes && self.covers(lba, buf.len()) {
            return Err(FsError::IOError);
        }
        self.inner.write_sectors(lba, buf)
    }

    fn total_sectors(&self) -> u64 {
        self.inner.total_sectors()
    }
}
