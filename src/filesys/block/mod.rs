pub mod memory;

pub use memory::MemoryBlockDevice;
