//! TIFF tag value reading.
//!
//! Values are stored either inline in the IFD entry (small values) or at an
//! offset in the file. Arrays such as TileOffsets are fetched with a single
//! range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

/// Name used in error messages for an entry's tag.
fn tag_name(entry: &IfdEntry) -> &'static str {
    TiffTag::from_u16(entry.tag_id)
        .map(TiffTag::name)
        .unwrap_or("unknown")
}

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file, respecting its byte order and layout.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// Inline values come from the entry itself; others are fetched from the
    /// file.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let size = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("value of {} bytes is too large", size),
            })?;
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size)?)
        }
    }

    /// Read a single integer value (Short, Long or Long8).
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }

        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected count 1, got {}", entry.count),
            });
        }

        self.read_u64_array(entry)?
            .first()
            .copied()
            .ok_or(TiffError::MissingTag(tag_name(entry)))
    }

    /// Read a single integer value that must fit in 32 bits.
    pub fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        let value = self.read_u64(entry)?;
        u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
            tag: tag_name(entry),
            message: format!("value {} does not fit in 32 bits", value),
        })
    }

    /// Read an array of integer values (Short, Long or Long8) as u64.
    ///
    /// This is how TileOffsets and TileByteCounts are loaded.
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if !matches!(
            field_type,
            FieldType::Short | FieldType::Long | FieldType::Long8
        ) {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected Short, Long, or Long8, got {:?}", field_type),
            });
        }

        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// Read the first Rational value of an entry as f64.
    ///
    /// A zero denominator is rejected rather than producing infinity.
    pub fn read_rational(&self, entry: &IfdEntry) -> Result<f64, TiffError> {
        if entry.field_type != Some(FieldType::Rational) {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected Rational, got type {}", entry.field_type_raw),
            });
        }
        if entry.count == 0 {
            return Err(TiffError::MissingTag(tag_name(entry)));
        }

        let bytes = self.read_bytes(entry)?;
        let byte_order = self.header.byte_order;
        let numerator = byte_order.read_u32(&bytes[0..4]);
        let denominator = byte_order.read_u32(&bytes[4..8]);
        if denominator == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: "zero denominator".to_string(),
            });
        }

        Ok(numerator as f64 / denominator as f64)
    }

    /// Read an ASCII value, stopping at the first NUL.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; vendor strings are not
    /// always clean.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected Ascii type for string, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read opaque bytes (JPEGTables, ICC profiles).
    pub fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        self.read_bytes(entry)
    }
}

// =============================================================================
// Array decoding from bytes
// =============================================================================

/// Parse an array of u64 values from raw bytes.
///
/// Trailing elements that do not fit in `bytes` are dropped.
fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    bytes
        .chunks_exact(width)
        .take(count)
        .filter_map(|chunk| match field_type {
            FieldType::Short => Some(byte_order.read_u16(chunk) as u64),
            FieldType::Long => Some(byte_order.read_u32(chunk) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(chunk)),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
