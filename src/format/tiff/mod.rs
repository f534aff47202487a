//! TIFF parser for Whole Slide Images.
//!
//! This module handles parsing of TIFF and BigTIFF files, the container for
//! Aperio SVS and generic pyramidal TIFF slides.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: Metadata and pointers to image data.
//!   Slides have one IFD per pyramid level plus associated images.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values at an offset pointed to by the entry.

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{best_level_for_downsample, ImageLayout, Organization, PyramidLevel, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, TiffTag, STRING_PROPERTY_TAGS};
pub use values::ValueReader;
