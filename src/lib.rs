//! Kernel resource management core: physical frame and heap allocators plus
//! FAT32 volume access.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]
extern crate alloc;

pub mod constants;
pub mod filesys;
pub mod logging;
pub mod memory;
