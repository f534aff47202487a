//! Decoding-engine contract.
//!
//! A slide handle never decodes pixels itself; it drives an engine through
//! the [`Engine`] and [`EngineSlide`] traits. The contract mirrors a C-style
//! slide library:
//!
//! - Methods never return `Result`. A failure is latched into the engine
//!   slide's error slot and the call returns a sentinel (`-1`, an empty
//!   list, a zeroed buffer).
//! - The first latched error wins and is never cleared. Once set, every
//!   later call returns sentinels.
//! - Releasing the engine slide is `Drop`.
//!
//! The crate ships [`TiffEngine`], a native engine for Aperio SVS and generic
//! pyramidal TIFF files.

mod cache;
mod region;
mod tiff;

use std::path::Path;
use std::sync::Arc;

pub use cache::{DecodedTile, TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use region::{premultiply, unpremultiply};
pub use tiff::{TiffEngine, TiffSlide};

// =============================================================================
// Engine Property Names
// =============================================================================

/// Namespace of the properties an engine synthesizes itself.
pub const PROPERTY_NAMESPACE: &str = "openslide.";

pub const PROPERTY_NAME_VENDOR: &str = "openslide.vendor";
pub const PROPERTY_NAME_COMMENT: &str = "openslide.comment";
pub const PROPERTY_NAME_BACKGROUND_COLOR: &str = "openslide.background-color";
pub const PROPERTY_NAME_BOUNDS_X: &str = "openslide.bounds-x";
pub const PROPERTY_NAME_BOUNDS_Y: &str = "openslide.bounds-y";
pub const PROPERTY_NAME_BOUNDS_WIDTH: &str = "openslide.bounds-width";
pub const PROPERTY_NAME_BOUNDS_HEIGHT: &str = "openslide.bounds-height";
pub const PROPERTY_NAME_MPP_X: &str = "openslide.mpp-x";
pub const PROPERTY_NAME_MPP_Y: &str = "openslide.mpp-y";
pub const PROPERTY_NAME_OBJECTIVE_POWER: &str = "openslide.objective-power";
pub const PROPERTY_NAME_QUICKHASH1: &str = "openslide.quickhash-1";
pub const PROPERTY_NAME_ICC_SIZE: &str = "openslide.icc-size";
pub const PROPERTY_NAME_LEVEL_COUNT: &str = "openslide.level-count";

/// `openslide.level[<level>].<field>`
pub fn level_property(level: usize, field: &str) -> String {
    format!("{}level[{}].{}", PROPERTY_NAMESPACE, level, field)
}

/// `openslide.associated.<name>.<field>`
pub fn associated_property(name: &str, field: &str) -> String {
    format!("{}associated.{}.{}", PROPERTY_NAMESPACE, name, field)
}

// =============================================================================
// Engine Traits
// =============================================================================

/// One opened slide inside a decoding engine.
///
/// Geometry uses signed integers so `-1` can signal failure. `read_region`
/// writes premultiplied ARGB (`0xAARRGGBB`) pixels.
pub trait EngineSlide: Send {
    /// The latched error message, if any.
    fn error(&self) -> Option<String>;

    /// Number of pyramid levels, `-1` on error.
    fn level_count(&self) -> i32;

    /// Level size in pixels, `(-1, -1)` on error or for an invalid level.
    fn level_dimensions(&self, level: i32) -> (i64, i64);

    /// Size of level 0 in pixels.
    fn level0_dimensions(&self) -> (i64, i64) {
        self.level_dimensions(0)
    }

    /// Downsample of a level relative to level 0, `-1.0` on error.
    fn level_downsample(&self, level: i32) -> f64;

    /// Level to read from when rendering at `downsample`, `-1` on error.
    fn best_level_for_downsample(&self, downsample: f64) -> i32;

    /// Fill `dest` with a `w * h` region of `level` whose top-left corner is
    /// `(x, y)` in level-0 coordinates.
    fn read_region(&self, dest: &mut [u32], x: i64, y: i64, level: i32, w: i64, h: i64);

    /// Names of every vendor and engine property.
    fn property_names(&self) -> Vec<String>;

    /// Value of one property.
    fn property_value(&self, name: &str) -> Option<String>;

    /// Names of the associated images (thumbnail, label, macro, ...).
    fn associated_image_names(&self) -> Vec<String>;

    /// Size of an associated image, `(-1, -1)` on error or for an unknown name.
    fn associated_image_dimensions(&self, name: &str) -> (i64, i64);

    /// Fill `dest` with the whole associated image.
    fn read_associated_image(&self, name: &str, dest: &mut [u32]);

    /// Size in bytes of the slide's ICC profile, `0` if absent, `-1` on error.
    fn icc_profile_size(&self) -> i64;

    /// Copy the slide's ICC profile into `dest`.
    fn read_icc_profile(&self, dest: &mut [u8]);

    /// Size in bytes of an associated image's ICC profile, `0` if absent.
    fn associated_image_icc_profile_size(&self, name: &str) -> i64;

    /// Copy an associated image's ICC profile into `dest`.
    fn read_associated_image_icc_profile(&self, name: &str, dest: &mut [u8]);

    /// Decode tiles through `cache` instead of the slide's private cache.
    fn set_cache(&mut self, cache: Arc<TileCache>);
}

/// A decoding engine: opens slides and answers static queries.
pub trait Engine {
    /// The engine's slide type.
    type Slide: EngineSlide;

    /// Open the slide at `path`.
    ///
    /// Always returns a slide object; failures are reported through its
    /// error slot.
    fn open(&self, path: &Path) -> Self::Slide;

    /// Vendor of the slide at `path`, `None` if unrecognized.
    fn detect_vendor(&self, path: &Path) -> Option<String>;

    /// Engine version string.
    fn version(&self) -> &'static str;
}

// =============================================================================
// Test Engine
// =============================================================================
