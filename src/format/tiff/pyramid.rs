//! TIFF pyramid level identification and tile location.
//!
//! A slide file holds several IFDs: the pyramid levels, and for some vendors
//! associated images (thumbnail, label, macro). This module turns IFDs into
//! [`ImageLayout`]s, picks out the pyramid levels and loads tile locations.
//!
//! # Level Identification
//!
//! Any IFD with a tile structure (TileWidth, TileLength, TileOffsets,
//! TileByteCounts) is a level candidate unless the caller excludes it (vendor
//! code knows which IFDs are associated images). Candidates are sorted by area,
//! largest first, and each level's downsample is the mean of its width and
//! height ratios to level 0.

use std::collections::HashSet;

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to follow in the chain
const MAX_IFDS: usize = 256;

/// Compression value assumed when the tag is absent (TIFF default)
const DEFAULT_COMPRESSION: u16 = 1;

// =============================================================================
// ImageLayout
// =============================================================================

/// How an image's pixel data is split into independently stored chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Organization {
    /// Rectangular tiles of TileWidth x TileLength
    Tiles,
    /// Full-width strips of RowsPerStrip rows
    Strips,
}

/// Geometry and storage description of one IFD's image.
///
/// Tiles and strips are both handled as a grid of chunks; a strip is a chunk
/// as wide as the image.
#[derive(Debug, Clone)]
pub struct ImageLayout {
    /// Index of the IFD in the file's IFD chain
    pub ifd_index: usize,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Chunk width in pixels
    pub chunk_width: u32,

    /// Chunk height in pixels
    pub chunk_height: u32,

    /// Number of chunks in X direction
    pub chunks_x: u32,

    /// Number of chunks in Y direction
    pub chunks_y: u32,

    /// Tiles or strips
    pub organization: Organization,

    /// Compression scheme (1 = none, 7 = JPEG)
    pub compression: u16,

    /// Samples per pixel
    pub samples_per_pixel: u32,

    /// Bits per sample of the first channel
    pub bits_per_sample: u32,

    /// Planar configuration (1 = chunky)
    pub planar_configuration: u32,

    /// TileOffsets or StripOffsets entry
    pub offsets_entry: IfdEntry,

    /// TileByteCounts or StripByteCounts entry
    pub byte_counts_entry: IfdEntry,

    /// JPEGTables entry (if present)
    pub jpeg_tables_entry: Option<IfdEntry>,

    /// ICC profile entry (if present)
    pub icc_profile_entry: Option<IfdEntry>,
}

impl ImageLayout {
    /// Describe the image stored in `ifd`.
    ///
    /// Returns None if the IFD has neither a complete tile structure nor strips,
    /// or if its dimensions are zero.
    pub fn from_ifd(ifd: &Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;
        if width == 0 || height == 0 {
            return None;
        }

        let (organization, chunk_width, chunk_height, offsets, byte_counts) = if ifd.is_tiled() {
            (
                Organization::Tiles,
                ifd.tile_width(byte_order)?,
                ifd.tile_height(byte_order)?,
                ifd.get_entry_by_tag(TiffTag::TileOffsets)?,
                ifd.get_entry_by_tag(TiffTag::TileByteCounts)?,
            )
        } else if ifd.is_stripped() {
            (
                Organization::Strips,
                width,
                ifd.rows_per_strip(byte_order)?.min(height),
                ifd.get_entry_by_tag(TiffTag::StripOffsets)?,
                ifd.get_entry_by_tag(TiffTag::StripByteCounts)?,
            )
        } else {
            return None;
        };

        if chunk_width == 0 || chunk_height == 0 {
            return None;
        }

        // BitsPerSample is per channel; the first value stands for all
        let bits_per_sample = ifd
            .get_entry_by_tag(TiffTag::BitsPerSample)
            .and_then(|e| {
                if e.count == 1 {
                    e.inline_u32(byte_order)
                } else if e.is_inline {
                    Some(byte_order.read_u16(&e.value_offset_bytes) as u32)
                } else {
                    // Out-of-line arrays: assume the common 8-bit case
                    Some(8)
                }
            })
            .unwrap_or(1);

        Some(ImageLayout {
            ifd_index,
            width,
            height,
            chunk_width,
            chunk_height,
            chunks_x: width.div_ceil(chunk_width),
            chunks_y: height.div_ceil(chunk_height),
            organization,
            compression: ifd.compression(byte_order).unwrap_or(DEFAULT_COMPRESSION),
            samples_per_pixel: ifd.samples_per_pixel(byte_order),
            bits_per_sample,
            planar_configuration: ifd.planar_configuration(byte_order),
            offsets_entry: offsets.clone(),
            byte_counts_entry: byte_counts.clone(),
            jpeg_tables_entry: ifd.get_entry_by_tag(TiffTag::JpegTables).cloned(),
            icc_profile_entry: ifd.get_entry_by_tag(TiffTag::IccProfile).cloned(),
        })
    }

    /// Total number of chunks.
    pub fn chunk_count(&self) -> u64 {
        self.chunks_x as u64 * self.chunks_y as u64
    }

    /// Get the chunk index for a given chunk coordinate.
    ///
    /// Returns None if the coordinates are out of bounds.
    pub fn chunk_index(&self, chunk_x: u32, chunk_y: u32) -> Option<u64> {
        if chunk_x >= self.chunks_x || chunk_y >= self.chunks_y {
            return None;
        }
        Some(chunk_y as u64 * self.chunks_x as u64 + chunk_x as u64)
    }

    /// Pixel dimensions of the image area a chunk covers.
    ///
    /// Edge chunks cover less than chunk_width/chunk_height; the stored tile
    /// may still be full size.
    pub fn chunk_dimensions(&self, chunk_x: u32, chunk_y: u32) -> Option<(u32, u32)> {
        if chunk_x >= self.chunks_x || chunk_y >= self.chunks_y {
            return None;
        }
        let w = (self.width - chunk_x * self.chunk_width).min(self.chunk_width);
        let h = (self.height - chunk_y * self.chunk_height).min(self.chunk_height);
        Some((w, h))
    }

    /// Fail unless chunks of this image can be decoded to RGBA.
    pub fn check_decodable(&self) -> Result<(), TiffError> {
        let compression = Compression::from_u16(self.compression)
            .ok_or_else(|| TiffError::UnsupportedCompression(format!("{}", self.compression)))?;
        if !compression.is_supported() {
            return Err(TiffError::UnsupportedCompression(
                compression.name().to_string(),
            ));
        }

        if compression == Compression::None {
            if self.bits_per_sample != 8 {
                return Err(TiffError::UnsupportedLayout(format!(
                    "{} bits per sample",
                    self.bits_per_sample
                )));
            }
            if !matches!(self.samples_per_pixel, 1 | 3 | 4) {
                return Err(TiffError::UnsupportedLayout(format!(
                    "{} samples per pixel",
                    self.samples_per_pixel
                )));
            }
            if self.planar_configuration != 1 {
                return Err(TiffError::UnsupportedLayout(
                    "planar sample organization".to_string(),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// PyramidLevel
// =============================================================================

/// A single level in the image pyramid.
///
/// Level 0 is the highest resolution; higher levels are progressively smaller.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Index of this level in the pyramid (0 = highest resolution)
    pub level_index: usize,

    /// Downsample factor relative to level 0 (1.0 for level 0)
    pub downsample: f64,

    /// Storage description of the level's image
    pub layout: ImageLayout,
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// A parsed TIFF file: every IFD plus the pyramid levels identified among them.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    /// The TIFF header
    pub header: TiffHeader,

    /// All IFDs in chain order
    pub ifds: Vec<Ifd>,

    /// Pyramid levels, sorted by resolution (0 = highest)
    pub levels: Vec<PyramidLevel>,
}

impl TiffPyramid {
    /// Read the header and follow the IFD chain.
    ///
    /// The chain stops at a zero offset, a repeated offset, or after
    /// `MAX_IFDS` directories.
    pub fn read_ifds<R: RangeReader>(reader: &R) -> Result<(TiffHeader, Vec<Ifd>), TiffError> {
        let header_len = (reader.size() as usize).min(BIGTIFF_HEADER_SIZE);
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS && seen.insert(offset) {
            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size())?;
            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            // Bound by the file size before allocating for the entries
            let max_entries = reader.size() / header.ifd_entry_size() as u64;
            if entry_count > max_entries {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            let ifd_size = Ifd::calculate_size(entry_count, &header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, &header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok((header, ifds))
    }

    /// Identify pyramid levels among `ifds`, skipping the indices in `excluded`.
    pub fn from_ifds(header: TiffHeader, ifds: Vec<Ifd>, excluded: &[usize]) -> Self {
        let byte_order = header.byte_order;

        let mut candidates: Vec<ImageLayout> = ifds
            .iter()
            .enumerate()
            .filter(|(index, ifd)| !excluded.contains(index) && ifd.is_tiled())
            .filter_map(|(index, ifd)| ImageLayout::from_ifd(ifd, index, byte_order))
            .collect();

        // Largest first; stable sort keeps file order for equal areas
        candidates.sort_by_key(|layout| {
            std::cmp::Reverse(layout.width as u64 * layout.height as u64)
        });

        let levels = match candidates.first() {
            Some(base) => {
                let base_width = base.width as f64;
                let base_height = base.height as f64;
                candidates
                    .into_iter()
                    .enumerate()
                    .map(|(level_index, layout)| {
                        let downsample_x = base_width / layout.width as f64;
                        let downsample_y = base_height / layout.height as f64;
                        PyramidLevel {
                            level_index,
                            downsample: (downsample_x + downsample_y) / 2.0,
                            layout,
                        }
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        TiffPyramid {
            header,
            ifds,
            levels,
        }
    }

    /// Get the number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Get the base (highest resolution) level.
    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }
}

/// Find the level best suited to render at `downsample`, given the level
/// downsamples in pyramid order.
///
/// Returns 0 when `downsample` is below level 0's factor, otherwise the
/// largest index whose downsample does not exceed it.
pub fn best_level_for_downsample(downsamples: impl IntoIterator<Item = f64>, downsample: f64) -> usize {
    downsamples
        .into_iter()
        .enumerate()
        .filter(|&(_, level)| level <= downsample)
        .map(|(index, _)| index)
        .last()
        .unwrap_or(0)
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Loaded chunk locations for an image.
#[derive(Debug, Clone)]
pub struct TileData {
    /// Byte offset of each chunk in the file
    pub offsets: Vec<u64>,

    /// Byte count (size) of each chunk
    pub byte_counts: Vec<u64>,

    /// JPEGTables data (if present)
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load chunk locations for an image.
    ///
    /// # Errors
    /// `InvalidTagValue` if the offset or byte count arrays are shorter than
    /// the chunk grid.
    pub fn load<R: RangeReader>(
        reader: &R,
        layout: &ImageLayout,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let value_reader = ValueReader::new(reader, header);

        let offsets = value_reader.read_u64_array(&layout.offsets_entry)?;
        let byte_counts = value_reader.read_u64_array(&layout.byte_counts_entry)?;

        let expected = layout.chunk_count();
        if (offsets.len() as u64) < expected || (byte_counts.len() as u64) < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "expected {} chunks, found {} offsets and {} byte counts",
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = layout
            .jpeg_tables_entry
            .as_ref()
            .map(|entry| value_reader.read_raw_bytes(entry))
            .transpose()?;

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// Get offset and size for a specific chunk.
    pub fn get_tile_location(&self, chunk_index: u64) -> Option<(u64, u64)> {
        let idx = usize::try_from(chunk_index).ok()?;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
