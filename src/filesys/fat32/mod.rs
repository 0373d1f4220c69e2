//! FAT32 volume access
//!
//! Mounts a pre-formatted volume from a [`BlockDevice`], follows cluster chains
//! through the allocation table, looks files up by their 8.3 name in the root
//! directory and moves file contents in and out of caller buffers. Files are
//! never created, grown or shrunk here; writes overwrite existing clusters only.

use super::*;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::min;
use core::ops::ControlFlow;
use log::{info, trace, warn};

mod boot_sector;
pub mod constants;
pub mod dir_entry;
mod fat_entry;
mod file;
#[cfg(test)]
mod test_image;

pub use boot_sector::BiosParameterBlock;
use constants::*;
pub use dir_entry::{short_name, Attributes, DirEntry83};
pub use fat_entry::{is_data_cluster, FatEntry};
pub use file::Fat32File;

/// FAT32 filesystem driver
pub struct Fat32<'a> {
    /// Underlying block device
    pub device: Box<dyn BlockDevice + 'a>,
    /// Geometry read from the boot sector
    bpb: BiosParameterBlock,
    /// Starting sector of first FAT
    fat_start: u64,
    /// Starting sector of cluster 2
    data_start: u64,
}

impl<'a> Fat32<'a> {
    /// Reads and validates the boot sector of `device`.
    ///
    /// The volume's sector size must match the device's, since every sector
    /// buffer is sized by the device.
    pub fn mount(device: Box<dyn BlockDevice + 'a>) -> Result<Self, FsError> {
        let mut boot_sector_data = vec![0u8; device.sector_size()];
        device.read_sectors(0, &mut boot_sector_data)?;

        let bpb = BiosParameterBlock::parse(&boot_sector_data)?;
        if bpb.bytes_per_sector as usize != device.sector_size() {
            warn!(
                "FAT32: volume sector size {} does not match device sector size {}",
                bpb.bytes_per_sector,
                device.sector_size()
            );
            return Err(FsError::InvalidBootSector);
        }

        let fat_start = bpb.fat_start();
        let data_start = bpb.data_start();
        info!(
            "FAT32: mounted, {} bytes/sector, {} sectors/cluster, {} FATs of {} sectors, data at {}, root cluster {}",
            bpb.bytes_per_sector,
            bpb.sectors_per_cluster,
            bpb.num_fats,
            bpb.fat_size_sectors,
            data_start,
            bpb.root_cluster
        );

        Ok(Fat32 {
            device,
            bpb,
            fat_start,
            data_start,
        })
    }

    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.bpb
    }

    pub fn fat_start(&self) -> u64 {
        self.fat_start
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    pub fn bytes_per_cluster(&self) -> usize {
        self.bpb.bytes_per_cluster()
    }

    fn bytes_per_sector(&self) -> usize {
        self.bpb.bytes_per_sector as usize
    }

    /// First sector of `cluster`, or `None` if it does not address the data region
    pub fn cluster_to_lba(&self, cluster: u32) -> Option<u64> {
        if !is_data_cluster(cluster) {
            return None;
        }
        Some(
            self.data_start
                + (cluster - FIRST_DATA_CLUSTER) as u64 * self.bpb.sectors_per_cluster as u64,
        )
    }

    /// Sector and in-sector offset of `cluster`'s entry in FAT copy `copy`
    fn fat_location(&self, copy: u8, cluster: u32) -> Option<(u64, usize)> {
        let bps = self.bytes_per_sector() as u64;
        let offset = cluster as u64 * FAT_ENTRY_SIZE as u64;
        let sector_index = offset / bps;
        let sector_offset = (offset % bps) as usize;

        if sector_index >= self.bpb.fat_size_sectors as u64
            || sector_offset + FAT_ENTRY_SIZE > bps as usize
        {
            return None;
        }

        let fat = self.fat_start + copy as u64 * self.bpb.fat_size_sectors as u64;
        Some((fat + sector_index, sector_offset))
    }

    /// Follows the allocation table one step from `cluster`.
    ///
    /// Reserved, terminal and out-of-table clusters all report
    /// [`END_OF_CHAIN`]. Only device failures are errors.
    pub fn next_cluster(&self, cluster: u32) -> Result<u32, FsError> {
        if !is_data_cluster(cluster) {
            return Ok(END_OF_CHAIN);
        }
        let Some((sector, sector_offset)) = self.fat_location(0, cluster) else {
            return Ok(END_OF_CHAIN);
        };

        let mut sector_data = vec![0u8; self.bytes_per_sector()];
        self.device.read_sectors(sector, &mut sector_data)?;

        let raw = boot_sector::read_u32(&sector_data, sector_offset);
        Ok(FatEntry::from_raw(raw).cluster)
    }

    /// Points `cluster`'s FAT entry at `next` in every FAT copy, keeping the
    /// reserved top 4 bits of each stored entry.
    pub fn set_next_cluster(&mut self, cluster: u32, next: u32) -> Result<(), FsError> {
        if !is_data_cluster(cluster) {
            return Err(FsError::InvalidCluster);
        }

        let entry = FatEntry { cluster: next };
        let mut sector_data = vec![0u8; self.bytes_per_sector()];

        for copy in 0..self.bpb.num_fats {
            let (sector, sector_offset) = self
                .fat_location(copy, cluster)
                .ok_or(FsError::InvalidCluster)?;

            self.device.read_sectors(sector, &mut sector_data)?;
            let existing = boot_sector::read_u32(&sector_data, sector_offset);
            sector_data[sector_offset..sector_offset + FAT_ENTRY_SIZE]
                .copy_from_slice(&entry.merge_into(existing).to_le_bytes());
            self.device.write_sectors(sector, &sector_data)?;
        }

        trace!("FAT32: cluster {} -> {:#x}", cluster, next);
        Ok(())
    }

    /// Calls `visit` on each live root directory entry until it breaks or the
    /// directory ends. Deleted slots and long-name fragments are skipped.
    fn scan_root<B>(
        &self,
        mut visit: impl FnMut(&DirEntry83) -> ControlFlow<B>,
    ) -> Result<Option<B>, FsError> {
        let mut sector_buffer = vec![0u8; self.bytes_per_sector()];
        let mut chain = ChainCursor::start(self.bpb.root_cluster);

        while let Some(lba) = chain.current().and_then(|c| self.cluster_to_lba(c)) {
            for sector in lba..lba + self.bpb.sectors_per_cluster as u64 {
                self.device.read_sectors(sector, &mut sector_buffer)?;

                for raw in sector_buffer.chunks_exact(DIR_ENTRY_SIZE) {
                    let entry = DirEntry83::parse(raw);
                    if entry.is_free() {
                        return Ok(None);
                    }
                    if entry.is_deleted() || entry.is_long_name() {
                        continue;
                    }
                    if let ControlFlow::Break(found) = visit(&entry) {
                        return Ok(Some(found));
                    }
                }
            }
            chain.advance(self)?;
        }

        Ok(None)
    }

    /// Looks up `name` in the root directory.
    ///
    /// `name` is the padded 11-byte on-disk form (`"HELLO   TXT"`) and must
    /// match exactly, case included. See [`short_name`] for converting
    /// display names.
    pub fn find_file(&self, name: &str) -> Result<Fat32File, FsError> {
        let name = name.as_bytes();
        if name.len() != SHORT_NAME_LENGTH {
            return Err(FsError::InvalidName);
        }

        let found = self.scan_root(|entry| {
            if entry.name == name {
                ControlFlow::Break(Fat32File::from(entry))
            } else {
                ControlFlow::Continue(())
            }
        })?;

        found.ok_or(FsError::NotFound)
    }

    /// Lists the live entries of the root directory in on-disk order
    pub fn read_root_dir(&self) -> Result<Vec<DirEntry83>, FsError> {
        let mut entries = Vec::new();
        self.scan_root(|entry| {
            entries.push(*entry);
            ControlFlow::<()>::Continue(())
        })?;
        Ok(entries)
    }

    /// Copies the whole of `file` into the front of `buf`
    pub fn read_file(&self, file: &Fat32File, buf: &mut [u8]) -> Result<(), FsError> {
        let size = file.size as usize;
        if size == 0 {
            return Ok(());
        }
        if buf.len() < size {
            return Err(FsError::BufferTooSmall);
        }

        let bps = self.bytes_per_sector();
        let mut sector_data = vec![0u8; bps];
        let mut chain = ChainCursor::start(file.first_cluster);
        let mut done = 0;

        loop {
            let lba = chain
                .current()
                .and_then(|c| self.cluster_to_lba(c))
                .ok_or(FsError::ChainExhausted)?;

            for sector in lba..lba + self.bpb.sectors_per_cluster as u64 {
                let n = min(bps, size - done);
                self.device.read_sectors(sector, &mut sector_data)?;
                buf[done..done + n].copy_from_slice(&sector_data[..n]);
                done += n;

                if done == size {
                    trace!("FAT32: read {} bytes from cluster {}", size, file.first_cluster);
                    return Ok(());
                }
            }
            chain.advance(self)?;
        }
    }

    /// Overwrites the contents of `file` with the first `file.size` bytes of
    /// `buf`, following its existing cluster chain.
    ///
    /// Bytes past the end of the file in its final sector are preserved.
    /// Sectors are written in chain order and nothing is rolled back: if the
    /// chain ends early or the device fails, the sectors written before the
    /// error keep their new contents.
    pub fn write_file(&mut self, file: &Fat32File, buf: &[u8]) -> Result<(), FsError> {
        let size = file.size as usize;
        if size == 0 {
            return Ok(());
        }
        if buf.len() < size {
            return Err(FsError::BufferTooSmall);
        }

        let bps = self.bytes_per_sector();
        let mut sector_data = vec![0u8; bps];
        let mut chain = ChainCursor::start(file.first_cluster);
        let mut done = 0;

        loop {
            let lba = chain
                .current()
                .and_then(|c| self.cluster_to_lba(c))
                .ok_or(FsError::ChainExhausted)?;

            for sector in lba..lba + self.bpb.sectors_per_cluster as u64 {
                let n = min(bps, size - done);
                if n == bps {
                    self.device.write_sectors(sector, &buf[done..done + n])?;
                } else {
                    self.device.read_sectors(sector, &mut sector_data)?;
                    sector_data[..n].copy_from_slice(&buf[done..done + n]);
                    self.device.write_sectors(sector, &sector_data)?;
                }
                done += n;

                if done == size {
                    trace!("FAT32: wrote {} bytes to cluster {}", size, file.first_cluster);
                    return Ok(());
                }
            }
            chain.advance(self)?;
        }
    }

    pub fn file_size(&self, file: &Fat32File) -> u32 {
        file.size
    }
}

/// Position in a cluster chain, bounded by [`MAX_CHAIN_LENGTH`] clusters
struct ChainCursor {
    cluster: Option<u32>,
    visited: usize,
}

impl ChainCursor {
    fn start(first_cluster: u32) -> Self {
        Self {
            cluster: FatEntry { cluster: first_cluster }.next(),
            visited: 1,
        }
    }

    /// Current cluster, or `None` once the chain has ended
    fn current(&self) -> Option<u32> {
        self.cluster
    }

    fn advance(&mut self, fs: &Fat32) -> Result<(), FsError> {
        let Some(cluster) = self.cluster else {
            return Ok(());
        };

        let entry = FatEntry::from_raw(fs.next_cluster(cluster)?);
        self.cluster = entry.next();

        match self.cluster {
            Some(next) => {
                self.visited += 1;
                if self.visited > MAX_CHAIN_LENGTH {
                    warn!(
                        "FAT32: chain through cluster {} exceeds {} clusters",
                        next, MAX_CHAIN_LENGTH
                    );
                    return Err(FsError::CorruptChain);
                }
            }
            None if !entry.is_end_of_chain() => {
                warn!(
                    "FAT32: chain breaks at cluster {} (entry {:#x})",
                    cluster, entry.cluster
                );
            }
            None => {}
        }
        Ok(())
    }
}
