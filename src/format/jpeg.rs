//! JPEG tile handling: abbreviated streams and decoding.
//!
//! # Abbreviated JPEG Streams
//!
//! SVS files store each tile as an "abbreviated" JPEG stream: the scan data
//! is present but the quantization (DQT) and Huffman (DHT) tables live once
//! in the IFD's `JPEGTables` tag. Before decoding, the tables are spliced in:
//!
//! ```text
//! tables: SOI DQT DHT EOI      tile: SOI SOF SOS <scan> EOI
//! merged: SOI DQT DHT SOF SOS <scan> EOI
//! ```

use bytes::{Bytes, BytesMut};
use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, RgbaImage};

use crate::error::TiffError;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// What the header segments of a stream contain before its first scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    /// DQT or DHT appears before SOS
    Complete,
    /// SOS appears with no table segment before it
    Abbreviated,
    /// Not a JPEG, or ends before either is found
    Unknown,
}

/// Walk marker segments after SOI until a table or scan marker is found.
///
/// Only header segments are walked; entropy-coded data is never scanned, so
/// byte pairs inside scan data cannot be mistaken for markers.
fn classify(data: &[u8]) -> StreamKind {
    if data.len() < 4 || data[0..2] != SOI {
        return StreamKind::Unknown;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return StreamKind::Unknown;
        }
        let marker = [data[pos], data[pos + 1]];
        match marker {
            DQT | DHT => return StreamKind::Complete,
            SOS => return StreamKind::Abbreviated,
            // Fill bytes
            [0xFF, 0xFF] => pos += 1,
            // Standalone markers carry no length
            [0xFF, 0x01] | [0xFF, 0xD0..=0xD7] => pos += 2,
            _ => {
                if pos + 3 >= data.len() {
                    return StreamKind::Unknown;
                }
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
        }
    }

    StreamKind::Unknown
}

/// Check if JPEG data is an abbreviated stream (missing tables).
fn is_abbreviated_stream(data: &[u8]) -> bool {
    classify(data) == StreamKind::Abbreviated
}

// =============================================================================
// JPEG Tables Merging
// =============================================================================

/// Merge JPEGTables with abbreviated tile data.
///
/// The trailing EOI of `tables` and the leading SOI of `tile_data` are
/// dropped, so the result has exactly one of each.
fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI[..]).unwrap_or(tables);
    let tile = tile_data.strip_prefix(&SOI[..]).unwrap_or(tile_data);

    let mut result = BytesMut::with_capacity(tables.len() + tile.len());
    result.extend_from_slice(tables);
    result.extend_from_slice(tile);
    result.freeze()
}

/// Prepare tile data for decoding, merging tables only when the tile lacks
/// its own.
fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if is_abbreviated_stream(tile_data) => merge_jpeg_tables(tables, tile_data),
        _ => Bytes::copy_from_slice(tile_data),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a JPEG tile to 8-bit RGBA.
///
/// `tables` is the IFD's JPEGTables, merged in when the tile is abbreviated.
pub fn decode_tile(tables: Option<&[u8]>, tile_data: &[u8]) -> Result<RgbaImage, TiffError> {
    let stream = prepare_tile_jpeg(tables, tile_data);
    let decoder = JpegDecoder::new(std::io::Cursor::new(&stream[..]))
        .map_err(|e| TiffError::Decode(format!("JPEG header: {}", e)))?;
    let image = DynamicImage::from_decoder(decoder)
        .map_err(|e| TiffError::Decode(format!("JPEG data: {}", e)))?;
    Ok(image.to_rgba8())
}

// =============================================================================
// Tests
// =============================================================================
