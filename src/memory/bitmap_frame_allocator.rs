use crate::constants::memory::{BITMAP_ENTRIES, BITMAP_ENTRY_SIZE, FRAME_SIZE, FULL_BITMAP_ENTRY, MAX_FRAMES};
use log::{debug, trace};
use x86_64::{
    structures::paging::{frame::PhysFrameRange, FrameAllocator, FrameDeallocator, PhysFrame, Size4KiB},
    PhysAddr,
};

/// Physical frame table with one bit per frame (1 = used, 0 = free).
pub struct BitmapFrameAllocator {
    free_frames: usize,
    bitmap: [u64; BITMAP_ENTRIES],
}

impl Default for BitmapFrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BitmapFrameAllocator {
    /// Creates a frame table with every frame free.
    pub const fn new() -> Self {
        Self {
            free_frames: MAX_FRAMES,
            bitmap: [0; BITMAP_ENTRIES],
        }
    }

    /// Resets the table and marks `reserved` as used.
    ///
    /// Meant to run once at boot. Calling it again drops every earlier grant.
    /// Frames of `reserved` beyond the table are ignored.
    pub fn init(&mut self, reserved: PhysFrameRange) {
        self.bitmap.fill(0);
        self.free_frames = MAX_FRAMES;

        for frame in reserved {
            self.mark_frame_used(frame);
        }

        debug!(
            "frame table ready: {} of {} frames free",
            self.free_frames, MAX_FRAMES
        );
    }

    /// Check if frame is used. Frames outside the table count as used.
    pub fn is_frame_used(&self, frame: PhysFrame) -> bool {
        match Self::frame_index(frame) {
            Some(frame_index) => self.is_bit_set(frame_index),
            None => true,
        }
    }

    pub fn free_frames(&self) -> usize {
        self.free_frames
    }

    pub fn used_frames(&self) -> usize {
        MAX_FRAMES - self.free_frames
    }

    /// Returns a frame to the table.
    ///
    /// The frame is not checked against earlier grants. Freeing an already
    /// free frame or one outside the table changes nothing.
    pub fn free_frame(&mut self, frame: PhysFrame) {
        match Self::frame_index(frame) {
            Some(frame_index) => {
                if self.clear_bit(frame_index) {
                    trace!("freed frame {:#X}", frame.start_address().as_u64());
                }
            }
            None => trace!(
                "ignoring free of untracked frame {:#X}",
                frame.start_address().as_u64()
            ),
        }
    }

    fn mark_frame_used(&mut self, frame: PhysFrame) {
        if let Some(frame_index) = Self::frame_index(frame) {
            self.set_bit(frame_index);
        }
    }

    fn frame_index(frame: PhysFrame) -> Option<usize> {
        let frame_index = frame.start_address().as_u64() / FRAME_SIZE as u64;
        (frame_index < MAX_FRAMES as u64).then_some(frame_index as usize)
    }

    /// set a particular bit (1), returns false if it already was set
    fn set_bit(&mut self, frame_index: usize) -> bool {
        let entry_index = frame_index / BITMAP_ENTRY_SIZE;
        let mask = 1 << (frame_index % BITMAP_ENTRY_SIZE);

        if self.bitmap[entry_index] & mask != 0 {
            return false;
        }
        self.bitmap[entry_index] |= mask;
        self.free_frames -= 1;
        true
    }

    /// clear a particular bit (0), returns false if it already was clear
    fn clear_bit(&mut self, frame_index: usize) -> bool {
        let entry_index = frame_index / BITMAP_ENTRY_SIZE;
        let mask = 1 << (frame_index % BITMAP_ENTRY_SIZE);

        if self.bitmap[entry_index] & mask == 0 {
            return false;
        }
        self.bitmap[entry_index] &= !mask;
        self.free_frames += 1;
        true
    }

    fn is_bit_set(&self, frame_index: usize) -> bool {
        let mask = 1 << (frame_index % BITMAP_ENTRY_SIZE);
        self.bitmap[frame_index / BITMAP_ENTRY_SIZE] & mask != 0
    }
}

unsafe impl FrameAllocator<Size4KiB> for BitmapFrameAllocator {
    /// Grants the lowest free frame.
    fn allocate_frame(&mut self) -> Option<PhysFrame> {
        if self.free_frames == 0 {
            return None;
        }

        let entry_index = self
            .bitmap
            .iter()
            .position(|&entry| entry != FULL_BITMAP_ENTRY)?;
        let frame_index =
            entry_index * BITMAP_ENTRY_SIZE + self.bitmap[entry_index].trailing_ones() as usize;

        self.set_bit(frame_index);
        let addr = (frame_index * FRAME_SIZE) as u64;
        trace!("allocated frame {:#X}", addr);
        Some(PhysFrame::containing_address(PhysAddr::new(addr)))
    }
}

impl FrameDeallocator<Size4KiB> for BitmapFrameAllocator {
    unsafe fn deallocate_frame(&mut self, frame: PhysFrame<Size4KiB>) {
        self.free_frame(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64) -> PhysFrame {
        PhysFrame::containing_address(PhysAddr::new(index * FRAME_SIZE as u64))
    }

    fn allocator_with_reserved(start: u64, end: u64) -> Box<BitmapFrameAllocator> {
        let mut allocator = Box::new(BitmapFrameAllocator::new());
        allocator.init(PhysFrame::range(frame(start), frame(end)));
        allocator
    }

    #[test]
    fn test_init_marks_reserved_range() {
        let allocator = allocator_with_reserved(256, 256 + 4096);

        assert_eq!(allocator.used_frames(), 4096);
        assert!(!allocator.is_frame_used(frame(255)));
        assert!(allocator.is_frame_used(frame(256)));
        assert!(allocator.is_frame_used(frame(256 + 4095)));
        assert!(!allocator.is_frame_used(frame(256 + 4096)));
    }

    #[test]
    fn test_allocate_returns_lowest_free_frame() {
        let mut allocator = allocator_with_reserved(0, 3);

        assert_eq!(allocator.allocate_frame(), Some(frame(3)));
        assert_eq!(allocator.allocate_frame(), Some(frame(4)));
        assert!(allocator.is_frame_used(frame(4)));
    }

    #[test]
    fn test_allocate_skips_full_entries() {
        let mut allocator = allocator_with_reserved(0, 130);

        assert_eq!(allocator.allocate_frame(), Some(frame(130)));
    }

    #[test]
    fn test_free_makes_frame_reusable() {
        let mut allocator = allocator_with_reserved(0, 10);
        let granted = allocator.allocate_frame().unwrap();
        let free_before = allocator.free_frames();

        allocator.free_frame(granted);

        assert_eq!(allocator.free_frames(), free_before + 1);
        assert_eq!(allocator.allocate_frame(), Some(granted));
    }

    #[test]
    fn test_double_free_is_noop() {
        let mut allocator = allocator_with_reserved(0, 10);
        let granted = allocator.allocate_frame().unwrap();

        allocator.free_frame(granted);
        let free_after_first = allocator.free_frames();
        allocator.free_frame(granted);

        assert_eq!(allocator.free_frames(), free_after_first);
    }

    #[test]
    fn test_out_of_range_free_is_ignored() {
        let mut allocator = allocator_with_reserved(0, 10);
        let free_before = allocator.free_frames();

        allocator.free_frame(frame(MAX_FRAMES as u64 + 5));

        assert_eq!(allocator.free_frames(), free_before);
        assert!(allocator.is_frame_used(frame(MAX_FRAMES as u64 + 5)));
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut allocator = allocator_with_reserved(0, MAX_FRAMES as u64 - 2);

        assert!(allocator.allocate_frame().is_some());
        assert!(allocator.allocate_frame().is_some());
        assert_eq!(allocator.allocate_frame(), None);
    }

    #[test]
    fn test_reinit_resets_grants() {
        let mut allocator = allocator_with_reserved(0, 4);
        allocator.allocate_frame().unwrap();

        allocator.init(PhysFrame::range(frame(0), frame(4)));

        assert_eq!(allocator.used_frames(), 4);
        assert_eq!(allocator.allocate_frame(), Some(frame(4)));
    }

    #[test]
    fn test_deallocate_frame_trait() {
        let mut allocator = allocator_with_reserved(0, 1);
        let granted = allocator.allocate_frame().unwrap();

        unsafe { allocator.deallocate_frame(granted) };

        assert!(!allocator.is_frame_used(granted));
    }
}
