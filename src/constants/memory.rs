//! Physical frame and kernel heap configuration constants.

pub const FRAME_SIZE: usize = 4096;

/// Number of physical frames tracked by the frame table (1 GiB of RAM).
pub const MAX_FRAMES: usize = 262_144;
pub const BITMAP_ENTRY_SIZE: usize = 64;
pub const BITMAP_ENTRIES: usize = MAX_FRAMES / BITMAP_ENTRY_SIZE;
pub const FULL_BITMAP_ENTRY: u64 = 0xFFFFFFFFFFFFFFFF;

/// First frame of the range reserved for the kernel heap.
pub const HEAP_START_FRAME: u64 = 256;
// 4096 frames, 16 MiB of heap
pub const HEAP_FRAME_COUNT: u64 = 4096;

/// Alignment of every heap payload and block header.
pub const HEAP_ALIGNMENT: usize = 8;

/// Extra bytes a free block must have beyond the request and a new header
/// before it is split; smaller remainders stay with the allocation.
pub const HEAP_SPLIT_SLACK: usize = 64;
