pub mod bitmap_frame_allocator;
pub mod heap;

use crate::constants::memory::{FRAME_SIZE, HEAP_FRAME_COUNT, HEAP_START_FRAME};
use bitmap_frame_allocator::BitmapFrameAllocator;
use heap::LockedHeap;
use log::info;
use x86_64::{
    structures::paging::{frame::PhysFrameRange, PhysFrame},
    PhysAddr,
};

/// Frames handed to the kernel heap at boot.
pub fn reserved_heap_frames() -> PhysFrameRange {
    let frame_size = FRAME_SIZE as u64;
    let start = PhysFrame::containing_address(PhysAddr::new(HEAP_START_FRAME * frame_size));
    let end = PhysFrame::containing_address(PhysAddr::new(
        (HEAP_START_FRAME + HEAP_FRAME_COUNT) * frame_size,
    ));
    PhysFrame::range(start, end)
}

/// Number of bytes covered by `frames`.
pub fn range_bytes(frames: PhysFrameRange) -> usize {
    let start = frames.start.start_address().as_u64();
    let end = frames.end.start_address().as_u64();
    end.saturating_sub(start) as usize
}

/// Boot-time memory bring-up: reset the frame table with `reserved` marked
/// used, then build the heap over those frames.
///
/// # Safety
///
/// `heap_base` must map the frames of `reserved` contiguously and be valid for
/// reads and writes of `range_bytes(reserved)` bytes for as long as `heap`
/// serves allocations.
pub unsafe fn init(
    frames: &mut BitmapFrameAllocator,
    heap: &LockedHeap,
    reserved: PhysFrameRange,
    heap_base: *mut u8,
) {
    frames.init(reserved);
    heap.init(heap_base, range_bytes(reserved));

    info!(
        "memory ready: {} frames free, {} heap bytes free",
        frames.free_frames(),
        heap.lock().free_bytes()
    );
}
