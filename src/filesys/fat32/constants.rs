//! FAT32 filesystem constants

/// Size of FAT entry in bytes (32-bit)
pub const FAT_ENTRY_SIZE: usize = 4;

/// Size of a directory entry in bytes
pub const DIR_ENTRY_SIZE: usize = 32;

/// Length of a space padded 8.3 name (8 name bytes, 3 extension bytes)
pub const SHORT_NAME_LENGTH: usize = 11;

/// Maximum length of filename excluding extension
pub const MAX_FILENAME_LENGTH: usize = 8;

/// Maximum length of file extension
pub const MAX_EXTENSION_LENGTH: usize = 3;

/// Largest accepted `bytes_per_sector`
pub const MAX_BYTES_PER_SECTOR: u16 = 4096;

/// Largest accepted `sectors_per_cluster`
pub const MAX_SECTORS_PER_CLUSTER: u8 = 128;

/// Cluster numbers below this are reserved
pub const FIRST_DATA_CLUSTER: u32 = 2;

/// Significant bits of a FAT entry; the top 4 bits are reserved
pub const CLUSTER_MASK: u32 = 0x0FFF_FFFF;

/// Entries at or above this value end a chain
pub const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;

/// End-of-chain value reported for invalid or terminal lookups
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

/// Entry value marking a bad cluster
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// Upper bound on clusters visited by one chain walk
pub const MAX_CHAIN_LENGTH: usize = 10_000;

/// Marker for deleted directory entries
pub const DELETED_ENTRY_MARKER: u8 = 0xE5;

/// Marker for the first unused directory entry; nothing follows it
pub const END_OF_DIRECTORY_MARKER: u8 = 0x00;
