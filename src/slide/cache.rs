//! Shared tile cache handle.

use std::sync::Arc;

use tracing::debug;

use crate::engine::TileCache;
use crate::error::SlideError;

/// A tile cache that any number of slides may decode through.
///
/// The capacity is fixed at construction. Slides hold the cache by `Arc`,
/// so it lives as long as its longest holder.
///
/// # Example
///
/// ```no_run
/// use wsi_slide::{Cache, Slide};
///
/// let cache = Cache::create(64 * 1024 * 1024).unwrap();
/// let a = Slide::open("a.svs", Some(cache.clone()));
/// let b = Slide::open("b.svs", Some(cache));
/// ```
pub struct Cache {
    capacity: i64,
    tiles: Arc<TileCache>,
}

impl Cache {
    /// Create a cache holding up to `capacity` bytes of decoded tiles.
    ///
    /// # Errors
    /// `SlideError::Allocation` if `capacity` is negative or does not fit in
    /// the address space.
    pub fn create(capacity: i64) -> Result<Arc<Cache>, SlideError> {
        let bytes = usize::try_from(capacity).map_err(|_| SlideError::Allocation { capacity })?;
        debug!(capacity, "created tile cache");
        Ok(Arc::new(Cache {
            capacity,
            tiles: Arc::new(TileCache::with_capacity(bytes)),
        }))
    }

    /// The configured capacity in bytes.
    pub fn size(&self) -> i64 {
        self.capacity
    }

    /// Bytes of decoded tiles currently held.
    pub fn cached_bytes(&self) -> usize {
        self.tiles.size()
    }

    pub(crate) fn tile_cache(&self) -> Arc<TileCache> {
        Arc::clone(&self.tiles)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.capacity)
            .field("cached_bytes", &self.cached_bytes())
            .finish()
    }
}
