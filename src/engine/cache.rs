//! Tile cache for decoded pyramid tiles.
//!
//! Decoding a JPEG tile is the expensive part of a region read, and adjacent
//! regions share most of their tiles. This cache keeps decoded tiles in
//! premultiplied ARGB form so repeated reads skip decoding entirely.
//!
//! # Cache Key
//!
//! Tiles are cached by a composite key:
//! - Slide identifier (unique per opened engine slide)
//! - Pyramid level
//! - Tile X coordinate
//! - Tile Y coordinate
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of cached tiles in bytes and evicts
//! least-recently-used entries when the capacity is exceeded. A zero capacity
//! disables caching.

use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use tracing::trace;

/// Default cache capacity: 32 MiB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 32 * 1024 * 1024;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for decoded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Identifier of the engine slide that decoded the tile
    pub slide_id: u64,

    /// Pyramid level (0 = highest resolution)
    pub level: u32,

    /// Tile X coordinate (0-indexed from left)
    pub tile_x: u32,

    /// Tile Y coordinate (0-indexed from top)
    pub tile_y: u32,
}

impl TileCacheKey {
    /// Create a new cache key.
    pub fn new(slide_id: u64, level: u32, tile_x: u32, tile_y: u32) -> Self {
        Self {
            slide_id,
            level,
            tile_x,
            tile_y,
        }
    }
}

// =============================================================================
// Decoded Tile
// =============================================================================

/// A decoded tile: premultiplied ARGB pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    /// Width of the decoded pixel grid
    pub width: u32,

    /// Height of the decoded pixel grid
    pub height: u32,

    /// `width * height` pixels
    pub pixels: Arc<[u32]>,
}

impl DecodedTile {
    /// Bytes this tile accounts for in the cache.
    pub fn byte_size(&self) -> usize {
        self.pixels.len() * std::mem::size_of::<u32>()
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheState {
    entries: LruCache<TileCacheKey, DecodedTile>,
    current_size: usize,
}

/// LRU cache for decoded tiles with size-based capacity.
///
/// # Thread Safety
///
/// The cache is `Send + Sync`; one instance may be shared by slides read from
/// different threads via `Arc`.
pub struct TileCache {
    state: Mutex<CacheState>,

    /// Maximum total size in bytes
    max_size: usize,
}

impl TileCache {
    /// Create a new tile cache with default capacity (32 MiB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        // Bounded by bytes, not entry count
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                current_size: 0,
            }),
            max_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Poisoning is ignored; every update leaves the state consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a tile from the cache, marking it as recently used.
    pub fn get(&self, key: &TileCacheKey) -> Option<DecodedTile> {
        let mut state = self.lock();
        let tile = state.entries.get(key).cloned();
        if tile.is_some() {
            trace!(?key, "tile cache hit");
        }
        tile
    }

    /// Store a tile in the cache.
    ///
    /// Least-recently-used entries are evicted until the cache is within
    /// capacity. A tile larger than the whole capacity is not stored.
    pub fn put(&self, key: TileCacheKey, tile: DecodedTile) {
        let tile_size = tile.byte_size();
        if tile_size > self.max_size {
            return;
        }

        let mut state = self.lock();

        if let Some(old) = state.entries.pop(&key) {
            state.current_size = state.current_size.saturating_sub(old.byte_size());
        }

        state.entries.put(key, tile);
        state.current_size += tile_size;

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_size = state.current_size.saturating_sub(evicted.byte_size());
                }
                None => break,
            }
        }
    }

    /// Drop every tile decoded by `slide_id`.
    pub fn remove_slide(&self, slide_id: u64) {
        let mut state = self.lock();
        let keys: Vec<TileCacheKey> = state
            .entries
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| key.slide_id == slide_id)
            .collect();
        for key in keys {
            if let Some(tile) = state.entries.pop(&key) {
                state.current_size = state.current_size.saturating_sub(tile.byte_size());
            }
        }
    }

    /// Get the current total size of cached tiles in bytes.
    pub fn size(&self) -> usize {
        self.lock().current_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("capacity", &self.max_size)
            .field("size", &self.size())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
