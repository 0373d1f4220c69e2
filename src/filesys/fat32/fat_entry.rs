//! FAT32 file allocation table entry

use super::constants::{
    BAD_CLUSTER, CLUSTER_MASK, END_OF_CHAIN_MIN, FIRST_DATA_CLUSTER,
};

/// Represents a 32-bit FAT entry pointing to the next cluster in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatEntry {
    /// Cluster number or special value (0=free, >=0x0FFFFFF8=end), 28 bits
    pub cluster: u32,
}

impl FatEntry {
    /// Decodes an on-disk entry, dropping the reserved top 4 bits
    pub fn from_raw(raw: u32) -> Self {
        Self {
            cluster: raw & CLUSTER_MASK,
        }
    }

    /// Encodes this entry over `existing`, keeping its reserved top 4 bits
    pub fn merge_into(&self, existing: u32) -> u32 {
        (existing & !CLUSTER_MASK) | (self.cluster & CLUSTER_MASK)
    }

    /// Returns true if this entry marks the end of a cluster chain
    pub fn is_end_of_chain(&self) -> bool {
        self.cluster >= END_OF_CHAIN_MIN
    }

    pub fn is_bad(&self) -> bool {
        self.cluster == BAD_CLUSTER
    }

    /// Returns the next cluster if this entry links to a usable data cluster
    pub fn next(&self) -> Option<u32> {
        (is_data_cluster(self.cluster) && !self.is_bad()).then_some(self.cluster)
    }
}

/// Returns true if `cluster` may address the data region
pub fn is_data_cluster(cluster: u32) -> bool {
    (FIRST_DATA_CLUSTER..END_OF_CHAIN_MIN).contains(&cluster)
}
