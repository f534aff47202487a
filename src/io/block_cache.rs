use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use lru::LruCache;

use super::RangeReader;
use crate::error::IoError;

/// Default block size: 64KB
///
/// Large enough to cover a typical IFD plus its out-of-line tag arrays in a
/// single read, small enough that scattered tile reads do not waste I/O.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default cache capacity in number of blocks.
/// 64 blocks * 64KB = 4MB per open slide.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 64;

/// Block-based caching layer that wraps any RangeReader.
///
/// TIFF parsing issues many small reads at scattered offsets (headers, IFD
/// entries, tag arrays). The block cache turns them into a few aligned reads
/// of the underlying file.
///
/// Features:
/// - Fixed-size block cache (default 64KB blocks)
/// - LRU eviction when cache reaches capacity
/// - Handles reads spanning multiple blocks
pub struct BlockCache<R> {
    /// The underlying reader
    inner: R,
    /// Block size in bytes
    block_size: usize,
    /// Cached blocks indexed by block number
    cache: Mutex<LruCache<u64, Bytes>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Create a new BlockCache wrapping the given reader.
    ///
    /// Uses default block size (64KB) and cache capacity (64 blocks).
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CACHE_CAPACITY)
    }

    /// Create a new BlockCache with custom block size and capacity.
    ///
    /// # Arguments
    /// * `inner` - The underlying reader to wrap
    /// * `block_size` - Size of each cached block in bytes (clamped to at least 1)
    /// * `capacity` - Maximum number of blocks to cache (clamped to at least 1)
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            block_size: block_size.max(1),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a block from cache or fetch it from the underlying reader.
    fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(data) = cache.get(&block_idx) {
                return Ok(data.clone());
            }
        }

        // The lock is not held across the read; a racing fetch of the same
        // block only costs a duplicate read.
        let data = self.fetch_block_from_source(block_idx)?;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(block_idx, data.clone());
        Ok(data)
    }

    /// Fetch a block directly from the underlying reader.
    fn fetch_block_from_source(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let offset = block_idx * self.block_size as u64;
        let size = self.inner.size();

        // The last block may be shorter than block_size
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = std::cmp::min(self.block_size as u64, remaining) as usize;
        self.inner.read_exact_at(offset, len)
    }

    /// Calculate which block contains the given offset.
    #[inline]
    fn block_for_offset(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    /// Calculate the offset within a block.
    #[inline]
    fn offset_within_block(&self, offset: u64) -> usize {
        (offset % self.block_size as u64) as usize
    }
}

impl<R: RangeReader> RangeReader for BlockCache<R> {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > size) {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let start_block = self.block_for_offset(offset);
        let end_block = self.block_for_offset(offset + len as u64 - 1);

        if start_block == end_block {
            let block = self.get_block(start_block)?;
            let block_offset = self.offset_within_block(offset);
            Ok(block.slice(block_offset..block_offset + len))
        } else {
            let mut result = BytesMut::with_capacity(len);
            let mut remaining = len;
            let mut current_offset = offset;

            for block_idx in start_block..=end_block {
                let block = self.get_block(block_idx)?;
                let block_offset = self.offset_within_block(current_offset);
                let bytes_in_block = std::cmp::min(block.len() - block_offset, remaining);

                result.extend_from_slice(&block[block_offset..block_offset + bytes_in_block]);

                remaining -= bytes_in_block;
                current_offset += bytes_in_block as u64;
            }

            Ok(result.freeze())
        }
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
