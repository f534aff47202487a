//! # wsi-slide
//!
//! Slide handles for pyramidal Whole Slide Images (WSI).
//!
//! A [`Slide`] opens a slide file through a decoding engine, keeps a sticky
//! error state, synthesizes a uniform property catalog from vendor metadata,
//! answers pyramid-geometry queries and forwards pixel and ICC profile reads.
//!
//! ## Features
//!
//! - **Sticky errors**: the first error a slide observes is reported by every
//!   later call
//! - **Property catalog**: vendor keys plus a normalized `wsi.` namespace
//! - **Shared caching**: decoded tiles live in a byte-bounded [`Cache`] that
//!   many slides can share
//! - **Native engine**: [`TiffEngine`] reads Aperio SVS and pyramidal TIFF
//!   without system libraries
//!
//! ## Architecture
//!
//! - [`io`] - Positional file reads with block caching
//! - [`mod@format`] - TIFF/SVS parsers and JPEG handling
//! - [`engine`] - Engine contract and the built-in TIFF engine
//! - [`slide`] - Slide handles, the shared cache and the property catalog
//! - [`config`] - `slidetool` CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_slide::{Cache, Slide};
//!
//! let cache = Cache::create(128 * 1024 * 1024).unwrap();
//! let slide = Slide::open("CMU-1.svs", Some(cache));
//! if slide.has_error() {
//!     eprintln!("{}", slide.error_message());
//!     return;
//! }
//!
//! let (width, height) = slide.level0_dimensions().unwrap();
//! let level = slide.best_level_for_downsample(32.0).unwrap();
//! let overview = slide.read_region_image(0, 0, level, 1024, 768).unwrap();
//! println!("{}x{} slide, overview {:?}", width, height, overview.dimensions());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod io;
pub mod slide;

// Re-export commonly used types
pub use config::{Command, Config};
pub use engine::{
    premultiply, unpremultiply, Engine, EngineSlide, TiffEngine, TiffSlide,
    DEFAULT_TILE_CACHE_CAPACITY,
};
pub use error::{FormatError, IoError, SlideError, TiffError};
pub use format::{detect_format, detect_vendor, SlideFormat};
pub use io::{BlockCache, FileRangeReader, RangeReader};
pub use slide::{catalog, Cache, ErrorState, OpenOptions, Slide};
