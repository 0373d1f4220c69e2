//! System-wide constants.

pub mod memory;
