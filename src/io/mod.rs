//! I/O layer: positional range reads over slide files.
//!
//! Everything above this module reads through [`RangeReader`], so the TIFF
//! parser never touches a file handle directly. [`BlockCache`] sits between
//! the parser and [`FileRangeReader`] to coalesce small scattered reads.

mod block_cache;
mod range_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, FileRangeReader,
    RangeReader,
};
