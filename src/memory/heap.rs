//! The Kernel Heap
//!
//! First-fit free-list allocator over the frames reserved for the heap.
//!
//! Every block starts with a [`Block`] header stored in heap memory, followed
//! by its payload. Headers form a singly linked chain in ascending address
//! order that covers the whole heap without gaps:
//!
//! ```text
//! | hdr | payload | hdr | payload (free) | hdr | payload | ... | heap end
//! ```
//!
//! Freeing a block merges every pair of neighbouring free blocks in one pass
//! over the chain, so two free blocks are never adjacent between calls.

use crate::constants::memory::{HEAP_ALIGNMENT, HEAP_SPLIT_SLACK};
use core::{
    alloc::{GlobalAlloc, Layout},
    mem::size_of,
    ptr::{self, NonNull},
};
use log::{info, trace, warn};
use spin::{Mutex, MutexGuard};

/// Per-block bookkeeping stored directly in front of the payload.
#[repr(C, align(8))]
struct Block {
    /// Payload bytes, excluding this header. Always a multiple of `HEAP_ALIGNMENT`.
    size: usize,
    is_free: bool,
    /// Next block in address order.
    next: Option<NonNull<Block>>,
}

/// Size of one block header in bytes.
pub const HEADER_SIZE: usize = size_of::<Block>();

const _: () = assert!(HEADER_SIZE % HEAP_ALIGNMENT == 0);

/// Snapshot of the heap chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub blocks: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub used_bytes: usize,
    pub largest_free: usize,
}

pub struct Heap {
    head: Option<NonNull<Block>>,
    /// Address of the first header.
    start: usize,
    /// One past the last byte of the heap.
    end: usize,
    /// Payload bytes of all blocks currently handed out.
    used: usize,
}

// The chain is only reachable through `&mut Heap`.
unsafe impl Send for Heap {}

impl Default for Heap {
    fn default() -> Self {
        Self::empty()
    }
}

impl Heap {
    /// Creates a heap without backing memory. Every allocation fails until
    /// [`Heap::init`] runs.
    pub const fn empty() -> Self {
        Self {
            head: None,
            start: 0,
            end: 0,
            used: 0,
        }
    }

    /// Builds one free block spanning `[heap_start, heap_start + heap_size)`.
    ///
    /// The start is aligned up and the length truncated to `HEAP_ALIGNMENT`.
    /// A range too small for a header and one payload leaves the heap empty.
    ///
    /// # Safety
    ///
    /// The range must be valid for reads and writes and must not be used by
    /// anything else while the heap lives. Calling `init` again resets the
    /// heap: pointers handed out earlier dangle.
    pub unsafe fn init(&mut self, heap_start: *mut u8, heap_size: usize) {
        *self = Self::empty();

        let padding = heap_start.align_offset(HEAP_ALIGNMENT);
        let usable = match heap_size.checked_sub(padding) {
            Some(len) => len & !(HEAP_ALIGNMENT - 1),
            None => 0,
        };
        if padding == usize::MAX || usable < HEADER_SIZE + HEAP_ALIGNMENT {
            warn!("heap range of {} bytes is too small, heap left empty", heap_size);
            return;
        }

        let first = heap_start.add(padding).cast::<Block>();
        first.write(Block {
            size: usable - HEADER_SIZE,
            is_free: true,
            next: None,
        });

        self.head = NonNull::new(first);
        self.start = first as usize;
        self.end = self.start + usable;

        info!(
            "heap initialized: {} KiB at {:#X}",
            usable / 1024,
            self.start
        );
        self.check_chain();
    }

    /// Allocates `size` bytes (rounded up to `HEAP_ALIGNMENT`) from the first
    /// free block that fits.
    ///
    /// Returns `None` for a zero size or when no free block is large enough.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let size = align_up(size)?;

        for mut block in self.blocks() {
            // SAFETY: every chain node is a header written by this heap.
            let header = unsafe { block.as_mut() };
            if !header.is_free || header.size < size {
                continue;
            }

            if header.size >= size + HEADER_SIZE + HEAP_SPLIT_SLACK {
                // SAFETY: the tail header lies inside this block's payload.
                let tail = unsafe { payload(block).as_ptr().add(size).cast::<Block>() };
                unsafe {
                    tail.write(Block {
                        size: header.size - size - HEADER_SIZE,
                        is_free: true,
                        next: header.next,
                    });
                }
                header.size = size;
                header.next = NonNull::new(tail);
            }

            header.is_free = false;
            self.used += header.size;
            trace!("allocated {} bytes at {:#X}", header.size, block.as_ptr() as usize);
            self.check_chain();
            return Some(payload(block));
        }

        warn!("heap exhausted: no free block of {} bytes", size);
        None
    }

    /// Returns the block owning `ptr` to the heap and merges free neighbours.
    ///
    /// Null pointers, pointers outside the heap, pointers that are not the
    /// start of a payload and already free blocks are ignored.
    pub fn free(&mut self, ptr: *mut u8) {
        let Some(mut block) = self.block_of(ptr) else {
            return;
        };
        // SAFETY: `block_of` only returns chain nodes.
        let header = unsafe { block.as_mut() };
        if header.is_free {
            trace!("ignoring double free of {:p}", ptr);
            return;
        }

        header.is_free = true;
        self.used -= header.size;
        trace!("freed {} bytes at {:p}", header.size, ptr);

        self.coalesce();
        self.check_chain();
    }

    /// Allocates `count * size` zeroed bytes. Fails on multiplication overflow.
    pub fn zeroed_allocate(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let total = count.checked_mul(size)?;
        let ptr = self.allocate(total)?;
        // SAFETY: the payload holds at least `total` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, total) };
        Some(ptr)
    }

    /// Grows the allocation at `ptr` to `new_size` bytes.
    ///
    /// - null `ptr` behaves like [`Heap::allocate`]
    /// - `new_size == 0` frees `ptr` and returns `None`
    /// - a request that fits the current payload returns `ptr` unchanged
    ///
    /// Otherwise the contents move to a new block. If that allocation fails,
    /// `None` is returned and `ptr` stays valid.
    pub fn resize(&mut self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.allocate(new_size);
        }
        if new_size == 0 {
            self.free(ptr);
            return None;
        }

        let block = self.block_of(ptr)?;
        // SAFETY: `block_of` only returns chain nodes.
        let (old_size, is_free) = unsafe {
            let header = block.as_ref();
            (header.size, header.is_free)
        };
        if is_free {
            return None;
        }
        if new_size <= old_size {
            return NonNull::new(ptr);
        }

        let new_ptr = self.allocate(new_size)?;
        // SAFETY: both payloads are live, distinct and at least `old_size` long.
        unsafe { ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), old_size) };
        self.free(ptr);
        Some(new_ptr)
    }

    /// Sum of all free payload bytes.
    pub fn free_bytes(&self) -> usize {
        self.headers()
            .filter(|header| header.is_free)
            .map(|header| header.size)
            .sum()
    }

    /// Payload bytes of all live allocations.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Payload size of the live allocation at `ptr`.
    pub fn payload_size(&self, ptr: *mut u8) -> Option<usize> {
        let block = self.block_of(ptr)?;
        // SAFETY: `block_of` only returns chain nodes.
        let header = unsafe { block.as_ref() };
        (!header.is_free).then_some(header.size)
    }

    /// Returns true if `ptr` lies inside the heap range.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.start && addr < self.end
    }

    pub fn stats(&self) -> HeapStats {
        self.headers().fold(HeapStats::default(), |mut stats, header| {
            stats.blocks += 1;
            if header.is_free {
                stats.free_blocks += 1;
                stats.free_bytes += header.size;
                stats.largest_free = stats.largest_free.max(header.size);
            } else {
                stats.used_bytes += header.size;
            }
            stats
        })
    }

    fn blocks(&self) -> Blocks {
        Blocks { next: self.head }
    }

    fn headers(&self) -> impl Iterator<Item = &Block> {
        // SAFETY: see `blocks`; the headers live as long as `self`.
        self.blocks().map(|block| unsafe { &*block.as_ptr() })
    }

    /// Finds the chain node whose payload starts at `ptr`.
    fn block_of(&self, ptr: *mut u8) -> Option<NonNull<Block>> {
        if ptr.is_null() || !self.contains(ptr) {
            return None;
        }
        self.blocks().find(|&block| payload(block).as_ptr() == ptr)
    }

    /// Merges every run of adjacent free blocks into its first block.
    fn coalesce(&mut self) {
        let mut current = self.head;
        while let Some(mut block) = current {
            // SAFETY: chain nodes never alias each other.
            let header = unsafe { block.as_mut() };
            match header.next {
                Some(next) if header.is_free && unsafe { next.as_ref().is_free } => {
                    let absorbed = unsafe { next.as_ref() };
                    header.size += HEADER_SIZE + absorbed.size;
                    header.next = absorbed.next;
                }
                next => current = next,
            }
        }
    }

    /// Validates the chain layout and the live byte counter.
    #[cfg(debug_assertions)]
    fn check_chain(&self) {
        let mut expected = self.start;
        let mut previous_free = false;
        let mut used = 0;

        for block in self.blocks() {
            // SAFETY: chain nodes are valid headers.
            let header = unsafe { block.as_ref() };
            debug_assert_eq!(block.as_ptr() as usize, expected, "heap chain is not contiguous");
            debug_assert_eq!(header.size % HEAP_ALIGNMENT, 0, "unaligned block size");
            debug_assert!(!(previous_free && header.is_free), "adjacent free blocks");

            if !header.is_free {
                used += header.size;
            }
            previous_free = header.is_free;
            expected += HEADER_SIZE + header.size;
        }

        debug_assert_eq!(expected, self.end, "heap chain does not end at the heap end");
        debug_assert_eq!(used, self.used, "live byte counter drifted");
    }

    #[cfg(not(debug_assertions))]
    fn check_chain(&self) {}
}

/// Walks the chain in address order.
struct Blocks {
    next: Option<NonNull<Block>>,
}

impl Iterator for Blocks {
    type Item = NonNull<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.next?;
        // SAFETY: `next` links only ever point at headers inside the heap.
        self.next = unsafe { block.as_ref().next };
        Some(block)
    }
}

fn payload(block: NonNull<Block>) -> NonNull<u8> {
    // SAFETY: a header is always followed by its payload inside the heap.
    unsafe { NonNull::new_unchecked(block.as_ptr().cast::<u8>().add(HEADER_SIZE)) }
}

fn align_up(size: usize) -> Option<usize> {
    size.checked_add(HEAP_ALIGNMENT - 1)
        .map(|size| size & !(HEAP_ALIGNMENT - 1))
}

/// A [`Heap`] behind a spinlock, usable as the kernel's `#[global_allocator]`.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOCATOR: LockedHeap = LockedHeap::empty();
/// ```
pub struct LockedHeap(Mutex<Heap>);

impl Default for LockedHeap {
    fn default() -> Self {
        Self::empty()
    }
}

impl LockedHeap {
    pub const fn empty() -> Self {
        Self(Mutex::new(Heap::empty()))
    }

    /// # Safety
    ///
    /// Same contract as [`Heap::init`].
    pub unsafe fn init(&self, heap_start: *mut u8, heap_size: usize) {
        self.0.lock().init(heap_start, heap_size);
    }

    pub fn lock(&self) -> MutexGuard<'_, Heap> {
        self.0.lock()
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    /// Layouts aligned beyond `HEAP_ALIGNMENT` are refused.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGNMENT {
            return ptr::null_mut();
        }
        self.0
            .lock()
            .allocate(layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.0.lock().free(ptr);
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGNMENT {
            return ptr::null_mut();
        }
        self.0
            .lock()
            .zeroed_allocate(1, layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        self.0
            .lock()
            .resize(ptr, new_size)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}
