//! Format detection for Whole Slide Image files.
//!
//! Detection examines magic bytes and vendor markers only; it never decodes
//! pixels. Supported formats:
//!
//! - **Aperio SVS**: TIFF-based format identified by "Aperio" in ImageDescription
//! - **Generic Pyramidal TIFF**: Any TIFF whose first image is tiled

use std::path::Path;

use tracing::debug;

use crate::error::FormatError;
use crate::io::{FileRangeReader, RangeReader};

use super::tiff::{ByteOrder, Ifd, TiffHeader, TiffTag, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};

// =============================================================================
// SlideFormat
// =============================================================================

/// Detected slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    /// Aperio SVS format (TIFF-based with JPEGTables for abbreviated streams)
    AperioSvs,

    /// Generic pyramidal TIFF (standard tiled TIFF with multiple resolutions)
    GenericTiff,
}

impl SlideFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }

    /// Vendor identifier reported as the `vendor` property.
    pub const fn vendor(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "aperio",
            SlideFormat::GenericTiff => "generic-tiff",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Maximum bytes to read from ImageDescription for format detection.
const MAX_DESCRIPTION_BYTES: usize = 1024;

/// Marker string for Aperio SVS format.
const APERIO_MARKER: &[u8] = b"Aperio";

/// Detect the format of a slide file.
///
/// # Format Detection Logic
///
/// 1. Verify TIFF/BigTIFF magic
/// 2. Parse the first IFD; it must be tiled
/// 3. If ImageDescription contains "Aperio", classify as SVS
/// 4. Otherwise, classify as generic pyramidal TIFF
///
/// # Errors
/// * `FormatError::UnsupportedFormat` - not a TIFF, or the first image is not tiled
/// * `FormatError::Tiff` / `FormatError::Io` - malformed structure
pub fn detect_format<R: RangeReader>(reader: &R) -> Result<SlideFormat, FormatError> {
    if reader.size() < TIFF_HEADER_SIZE as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: "File too small to be a valid TIFF".to_string(),
        });
    }

    let header_len = (reader.size() as usize).min(BIGTIFF_HEADER_SIZE);
    let header_bytes = reader.read_exact_at(0, header_len)?;
    if !is_tiff_header(&header_bytes) {
        return Err(FormatError::UnsupportedFormat {
            reason: "Not a TIFF file".to_string(),
        });
    }
    let header = TiffHeader::parse(&header_bytes, reader.size())?;

    detect_format_from_first_ifd(reader, &header)
}

/// Detect format by examining the first IFD.
fn detect_format_from_first_ifd<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
) -> Result<SlideFormat, FormatError> {
    let count_bytes = reader.read_exact_at(header.first_ifd_offset, header.ifd_count_size())?;
    let entry_count = if header.is_bigtiff {
        header.byte_order.read_u64(&count_bytes)
    } else {
        header.byte_order.read_u16(&count_bytes) as u64
    };

    if entry_count > reader.size() / header.ifd_entry_size() as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: format!("Implausible IFD entry count {}", entry_count),
        });
    }

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(header.first_ifd_offset, ifd_size)?;
    let ifd = Ifd::parse(&ifd_bytes, header)?;

    if !ifd.is_tiled() {
        return Err(FormatError::UnsupportedFormat {
            reason: "TIFF is not tiled".to_string(),
        });
    }

    if let Some(description) = read_image_description(reader, &ifd, header)? {
        if contains_aperio_marker(&description) {
            return Ok(SlideFormat::AperioSvs);
        }
    }

    Ok(SlideFormat::GenericTiff)
}

/// Read at most `MAX_DESCRIPTION_BYTES` of the ImageDescription tag.
///
/// Returns None if the tag is not present or empty.
fn read_image_description<R: RangeReader>(
    reader: &R,
    ifd: &Ifd,
    header: &TiffHeader,
) -> Result<Option<Vec<u8>>, FormatError> {
    let entry = match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        Some(e) => e,
        None => return Ok(None),
    };

    let read_len = (entry.count as usize).min(MAX_DESCRIPTION_BYTES);
    if read_len == 0 {
        return Ok(None);
    }

    let bytes = if entry.is_inline {
        entry.value_offset_bytes[..read_len.min(entry.value_offset_bytes.len())].to_vec()
    } else {
        let offset = entry.value_offset(header.byte_order);
        let available = reader.size().saturating_sub(offset) as usize;
        reader.read_exact_at(offset, read_len.min(available))?.to_vec()
    };

    Ok(Some(bytes))
}

/// Check if bytes contain the Aperio marker.
fn contains_aperio_marker(data: &[u8]) -> bool {
    data.windows(APERIO_MARKER.len())
        .any(|window| window == APERIO_MARKER)
}

/// Check if bytes represent a valid TIFF header.
///
/// A quick check before attempting full parsing.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    let byte_order = match magic {
        0x4949 => ByteOrder::LittleEndian,
        0x4D4D => ByteOrder::BigEndian,
        _ => return false,
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == 42 || version == 43
}

/// Detect the vendor of the slide at `path` without opening it as a slide.
///
/// Returns None when the file is missing, unreadable or not a recognized
/// format.
pub fn detect_vendor(path: &Path) -> Option<&'static str> {
    let reader = FileRangeReader::open(path).ok()?;
    match detect_format(&reader) {
        Ok(format) => Some(format.vendor()),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "vendor detection failed");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
