//! Test utilities for integration tests.
//!
//! Builds small TIFF, BigTIFF and SVS slides on disk so the engine and slide
//! handles can be exercised end to end.

use std::io::Write;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use tempfile::NamedTempFile;

// =============================================================================
// Pixel Data
// =============================================================================

/// Encode a solid-color RGB JPEG.
pub fn solid_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Uncompressed RGB samples of a solid-color chunk.
pub fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    color
        .iter()
        .copied()
        .cycle()
        .take((width * height * 3) as usize)
        .collect()
}

/// Split a complete JPEG into (JPEGTables, abbreviated tile).
///
/// DQT and DHT segments move to the tables; the tile keeps SOI and every
/// other segment.
pub fn split_jpeg_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tables = vec![0xFF, 0xD8];
    let mut tile = vec![0xFF, 0xD8];
    let mut pos = 2;
    loop {
        let marker = [jpeg[pos], jpeg[pos + 1]];
        if marker == [0xFF, 0xDA] {
            tile.extend_from_slice(&jpeg[pos..]);
            break;
        }
        let length = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + length];
        if marker == [0xFF, 0xDB] || marker == [0xFF, 0xC4] {
            tables.extend_from_slice(segment);
        } else {
            tile.extend_from_slice(segment);
        }
        pos += 2 + length;
    }
    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, tile)
}

/// Whether every channel of `actual` is within `tolerance` of `expected`.
pub fn close_to(actual: [u8; 4], expected: [u8; 4], tolerance: u8) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| a.abs_diff(*e) <= tolerance)
}

// =============================================================================
// Image Directories
// =============================================================================

/// TIFF compression of an image's chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Jpeg,
    /// Stored with an unsupported compression id
    Other(u16),
}

impl Codec {
    fn id(self) -> u16 {
        match self {
            Codec::None => 1,
            Codec::Jpeg => 7,
            Codec::Other(id) => id,
        }
    }
}

/// One image file directory to write.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    /// `Some((w, h))` for tiles, None for one strip per `rows_per_strip` rows
    pub tile: Option<(u32, u32)>,
    pub rows_per_strip: u32,
    pub codec: Codec,
    pub samples_per_pixel: u16,
    /// Encoded chunks in row-major order
    pub chunks: Vec<Vec<u8>>,
    pub jpeg_tables: Option<Vec<u8>>,
    pub description: Option<String>,
    pub icc_profile: Option<Vec<u8>>,
    /// (x, y, unit)
    pub resolution: Option<(u32, u32, u16)>,
    pub ascii_tags: Vec<(u16, String)>,
}

impl ImageSpec {
    /// A tiled image whose every tile is `chunk`.
    pub fn tiled(width: u32, height: u32, tile: u32, codec: Codec, chunk: Vec<u8>) -> Self {
        let count = (width.div_ceil(tile) * height.div_ceil(tile)) as usize;
        Self {
            width,
            height,
            tile: Some((tile, tile)),
            rows_per_strip: 0,
            codec,
            samples_per_pixel: 3,
            chunks: vec![chunk; count],
            jpeg_tables: None,
            description: None,
            icc_profile: None,
            resolution: None,
            ascii_tags: Vec::new(),
        }
    }

    /// A solid-color uncompressed tiled image.
    pub fn solid_tiled(width: u32, height: u32, tile: u32, color: [u8; 3]) -> Self {
        Self::tiled(width, height, tile, Codec::None, solid_rgb(tile, tile, color))
    }

    /// A solid-color JPEG tiled image.
    pub fn jpeg_tiled(width: u32, height: u32, tile: u32, color: [u8; 3]) -> Self {
        Self::tiled(width, height, tile, Codec::Jpeg, solid_jpeg(tile, tile, color))
    }

    /// A single-strip uncompressed image, the way SVS stores label and macro.
    pub fn solid_strip(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            width,
            height,
            tile: None,
            rows_per_strip: height,
            codec: Codec::None,
            samples_per_pixel: 3,
            chunks: vec![solid_rgb(width, height, color)],
            jpeg_tables: None,
            description: None,
            icc_profile: None,
            resolution: None,
            ascii_tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_icc_profile(mut self, profile: Vec<u8>) -> Self {
        self.icc_profile = Some(profile);
        self
    }

    pub fn with_resolution(mut self, x: u32, y: u32, unit: u16) -> Self {
        self.resolution = Some((x, y, unit));
        self
    }

    pub fn with_ascii(mut self, tag: u16, value: impl Into<String>) -> Self {
        self.ascii_tags.push((tag, value.into()));
        self
    }

    /// Move the JPEG tables of every tile into a shared JPEGTables tag.
    pub fn with_shared_jpeg_tables(mut self) -> Self {
        let mut tables = None;
        for chunk in &mut self.chunks {
            let (t, tile) = split_jpeg_tables(chunk);
            tables = Some(t);
            *chunk = tile;
        }
        self.jpeg_tables = tables;
        self
    }
}

// =============================================================================
// TIFF Writer
// =============================================================================

#[derive(Clone, Copy)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

/// Raw value of one IFD entry.
enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    Rational(u32, u32),
    Ascii(String),
    Undefined(Vec<u8>),
}

/// Builder for TIFF files.
pub struct TiffBuilder {
    byte_order: ByteOrderType,
    is_bigtiff: bool,
    images: Vec<ImageSpec>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            is_bigtiff: false,
            images: Vec::new(),
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_bigtiff(mut self, is_bigtiff: bool) -> Self {
        self.is_bigtiff = is_bigtiff;
        self
    }

    pub fn add_image(mut self, image: ImageSpec) -> Self {
        self.images.push(image);
        self
    }

    /// Build the file. Each image's data precedes its IFD, so every offset
    /// is known when the IFD is written.
    pub fn build(self) -> Vec<u8> {
        let mut data = Vec::new();
        match self.byte_order {
            ByteOrderType::LittleEndian => data.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => data.extend_from_slice(b"MM"),
        }
        if self.is_bigtiff {
            self.put(&mut data, 43, 2);
            self.put(&mut data, 8, 2);
            self.put(&mut data, 0, 2);
        } else {
            self.put(&mut data, 42, 2);
        }
        let mut next_pointer = data.len();
        self.put(&mut data, 0, self.offset_size());

        for image in &self.images {
            let ifd_offset = self.write_image(&mut data, image);
            self.patch(&mut data, next_pointer, ifd_offset);
            next_pointer = data.len() - self.offset_size();
        }

        data
    }

    /// Write the build to a temp file with the given extension.
    pub fn write_temp(self, extension: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", extension))
            .tempfile()
            .unwrap();
        file.write_all(&self.build()).unwrap();
        file.flush().unwrap();
        file
    }

    fn write_image(&self, data: &mut Vec<u8>, image: &ImageSpec) -> u64 {
        let mut offsets = Vec::with_capacity(image.chunks.len());
        for chunk in &image.chunks {
            offsets.push(data.len() as u64);
            data.extend_from_slice(chunk);
        }
        let counts: Vec<u64> = image.chunks.iter().map(|c| c.len() as u64).collect();

        let mut entries: Vec<(u16, Value)> = vec![
            (256, Value::Long(vec![image.width])),
            (257, Value::Long(vec![image.height])),
            (258, Value::Short(vec![8])),
            (259, Value::Short(vec![image.codec.id()])),
            (262, Value::Short(vec![if image.samples_per_pixel == 1 { 1 } else { 2 }])),
            (277, Value::Short(vec![image.samples_per_pixel])),
            (284, Value::Short(vec![1])),
        ];

        let (offsets_tag, counts_tag) = match image.tile {
            Some((tw, th)) => {
                entries.push((322, Value::Long(vec![tw])));
                entries.push((323, Value::Long(vec![th])));
                (324, 325)
            }
            None => {
                entries.push((278, Value::Long(vec![image.rows_per_strip])));
                (273, 279)
            }
        };
        entries.push((offsets_tag, self.offsets_value(offsets)));
        entries.push((counts_tag, self.offsets_value(counts)));

        if let Some(description) = &image.description {
            entries.push((270, Value::Ascii(description.clone())));
        }
        for (tag, value) in &image.ascii_tags {
            entries.push((*tag, Value::Ascii(value.clone())));
        }
        if let Some((x, y, unit)) = image.resolution {
            entries.push((282, Value::Rational(x, 1)));
            entries.push((283, Value::Rational(y, 1)));
            entries.push((296, Value::Short(vec![unit])));
        }
        if let Some(tables) = &image.jpeg_tables {
            entries.push((347, Value::Undefined(tables.clone())));
        }
        if let Some(profile) = &image.icc_profile {
            entries.push((34675, Value::Undefined(profile.clone())));
        }
        entries.sort_by_key(|(tag, _)| *tag);

        // Out-of-line values go before the IFD
        let inline_size = self.offset_size();
        let mut encoded = Vec::with_capacity(entries.len());
        for (tag, value) in &entries {
            let (field_type, count, bytes) = self.encode(value);
            let field = if bytes.len() <= inline_size {
                let mut field = bytes;
                field.resize(inline_size, 0);
                field
            } else {
                if data.len() % 2 == 1 {
                    data.push(0);
                }
                let offset = data.len() as u64;
                data.extend_from_slice(&bytes);
                let mut field = Vec::new();
                self.put(&mut field, offset, inline_size);
                field
            };
            encoded.push((*tag, field_type, count, field));
        }

        if data.len() % 2 == 1 {
            data.push(0);
        }
        let ifd_offset = data.len() as u64;
        self.put(data, encoded.len() as u64, if self.is_bigtiff { 8 } else { 2 });
        for (tag, field_type, count, field) in encoded {
            self.put(data, tag as u64, 2);
            self.put(data, field_type as u64, 2);
            self.put(data, count, if self.is_bigtiff { 8 } else { 4 });
            data.extend_from_slice(&field);
        }
        self.put(data, 0, self.offset_size());

        ifd_offset
    }

    fn offsets_value(&self, values: Vec<u64>) -> Value {
        if self.is_bigtiff {
            Value::Long8(values)
        } else {
            Value::Long(values.into_iter().map(|v| v as u32).collect())
        }
    }

    /// (field type, count, bytes) of a value in this file's byte order.
    fn encode(&self, value: &Value) -> (u16, u64, Vec<u8>) {
        let mut bytes = Vec::new();
        match value {
            Value::Short(values) => {
                values.iter().for_each(|v| self.put(&mut bytes, *v as u64, 2));
                (3, values.len() as u64, bytes)
            }
            Value::Long(values) => {
                values.iter().for_each(|v| self.put(&mut bytes, *v as u64, 4));
                (4, values.len() as u64, bytes)
            }
            Value::Long8(values) => {
                values.iter().for_each(|v| self.put(&mut bytes, *v, 8));
                (16, values.len() as u64, bytes)
            }
            Value::Rational(numerator, denominator) => {
                self.put(&mut bytes, *numerator as u64, 4);
                self.put(&mut bytes, *denominator as u64, 4);
                (5, 1, bytes)
            }
            Value::Ascii(text) => {
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(0);
                let count = bytes.len() as u64;
                (2, count, bytes)
            }
            Value::Undefined(raw) => (7, raw.len() as u64, raw.clone()),
        }
    }

    fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    fn put(&self, data: &mut Vec<u8>, value: u64, size: usize) {
        let bytes = match self.byte_order {
            ByteOrderType::LittleEndian => value.to_le_bytes()[..size].to_vec(),
            ByteOrderType::BigEndian => value.to_be_bytes()[8 - size..].to_vec(),
        };
        data.extend_from_slice(&bytes);
    }

    fn patch(&self, data: &mut Vec<u8>, position: usize, value: u64) {
        let mut bytes = Vec::new();
        self.put(&mut bytes, value, self.offset_size());
        data[position..position + bytes.len()].copy_from_slice(&bytes);
    }
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Ready-made Slides
// =============================================================================

/// Level 0 ImageDescription of the synthetic SVS slides.
pub const SVS_DESCRIPTION: &str = "Aperio Image Library v12.0.15\r\n\
    1024x768 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.4990|Date = 12/29/09|ScanScope ID = CPAPERIOCS";

/// Colors of the synthetic pyramid levels, largest first.
pub const LEVEL_COLORS: [[u8; 3]; 3] = [[200, 40, 40], [40, 200, 40], [40, 40, 200]];

/// A three-level uncompressed generic TIFF: 1024x768, 512x384, 256x192.
pub fn generic_pyramid() -> TiffBuilder {
    TiffBuilder::new()
        .add_image(
            ImageSpec::solid_tiled(1024, 768, 256, LEVEL_COLORS[0])
                .with_resolution(40_000, 40_000, 3)
                .with_ascii(271, "Test Scanner"),
        )
        .add_image(ImageSpec::solid_tiled(512, 384, 256, LEVEL_COLORS[1]))
        .add_image(ImageSpec::solid_tiled(256, 192, 256, LEVEL_COLORS[2]))
}

/// An SVS slide: two JPEG levels with shared tables, a thumbnail, a label
/// without a profile and a macro with a 64-byte profile.
pub fn svs_slide() -> TiffBuilder {
    TiffBuilder::new()
        .add_image(
            ImageSpec::jpeg_tiled(1024, 768, 256, [220, 120, 160])
                .with_description(SVS_DESCRIPTION)
                .with_icc_profile(vec![0x5A; 128])
                .with_shared_jpeg_tables(),
        )
        .add_image(
            ImageSpec::solid_strip(64, 48, [10, 20, 30])
                .with_description("Aperio Image Library v12.0.15\r\n1024x768 -> 64x48"),
        )
        .add_image(ImageSpec::jpeg_tiled(256, 192, 256, [220, 120, 160]).with_shared_jpeg_tables())
        .add_image(
            ImageSpec::solid_strip(40, 30, [250, 250, 250])
                .with_description("Aperio Image Library v12.0.15\r\nlabel 40x30"),
        )
        .add_image(
            ImageSpec::solid_strip(80, 30, [90, 90, 90])
                .with_description("Aperio Image Library v12.0.15\r\nmacro 80x30")
                .with_icc_profile(vec![0x11; 64]),
        )
}

/// A single-level 256x256 uncompressed slide.
pub fn single_level() -> TiffBuilder {
    TiffBuilder::new().add_image(ImageSpec::solid_tiled(256, 256, 256, [128, 64, 32]))
}
