//! Format parsers for Whole Slide Image files.
//!
//! TIFF-based formats only: Aperio SVS and generic pyramidal TIFF.
//!
//! # Format Detection
//!
//! Use [`detect::detect_format`] to identify the format of an open reader, or
//! [`detect::detect_vendor`] for a path:
//!
//! - **Aperio SVS**: Identified by "Aperio" marker in ImageDescription
//! - **Generic Pyramidal TIFF**: Standard tiled TIFF with pyramid structure

pub mod detect;
pub mod jpeg;
pub mod svs;
pub mod tiff;

pub use detect::{detect_format, detect_vendor, SlideFormat};
pub use jpeg::decode_tile;
pub use svs::SvsMetadata;
