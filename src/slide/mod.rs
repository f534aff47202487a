//! Slide handles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Slide                   │
//! │ (sticky errors, property catalog)       │
//! └───────────┬─────────────────┬───────────┘
//!             │                 │ Arc
//!             ▼                 ▼
//! ┌─────────────────┐  ┌──────────────────┐
//! │  EngineSlide    │─▶│      Cache       │
//! │ (TiffSlide, ..) │  │ (shared tiles)   │
//! └─────────────────┘  └──────────────────┘
//! ```
//!
//! A [`Slide`] owns exactly one engine slide object and releases it on drop.
//! Any number of slides may decode through one [`Cache`].
//!
//! # Usage
//!
//! ```no_run
//! use wsi_slide::slide::{catalog, Cache, Slide};
//!
//! let cache = Cache::create(64 * 1024 * 1024).unwrap();
//! let slide = Slide::open("slide.svs", Some(cache));
//!
//! let properties = slide.properties().unwrap();
//! println!("levels: {}", properties[catalog::LEVEL_COUNT]);
//!
//! let mut pixels = vec![0u32; 256 * 256];
//! slide.read_region(&mut pixels, 1024, 1024, 0, 256, 256).unwrap();
//! ```

mod cache;
pub mod catalog;
mod handle;

pub use cache::Cache;
pub use handle::{ErrorState, OpenOptions, Slide};
