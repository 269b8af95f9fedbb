#![doc = include_str!("../README.md")]

mod buffer;
mod cursor;
pub mod error;
mod file_info;
mod geometry;
mod manager;
mod mmap;
mod region;
mod relation;

pub use buffer::SlidingBuffer;
pub use cursor::FixedCursor;
pub use error::*;
pub use file_info::{FileId, FileInfo, RawFd};
pub use geometry::allocation_granularity;
pub use manager::Manager;
pub use region::Region;

/// One gibibyte (1024^3 bytes).
#[allow(non_upper_case_globals)]
pub const GiB: u64 = 1024 * 1024 * 1024;
/// One mebibyte (1024^2 bytes).
#[allow(non_upper_case_globals)]
pub const MiB: u64 = 1024 * 1024;
