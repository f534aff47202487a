//! Native engine for TIFF-family slides.
//!
//! [`TiffEngine`] opens Aperio SVS and generic pyramidal TIFF files with the
//! crate's own parser. A [`TiffSlide`] holds everything needed to serve
//! reads: the block-cached file reader, pyramid levels with their chunk
//! locations, associated images and the property map built at open.
//!
//! # Errors
//!
//! Every failure, at open or later, is latched into the slide's error slot.
//! The first error wins; from then on every call returns a sentinel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{FormatError, TiffError};
use crate::format::jpeg::decode_tile;
use crate::format::svs::{self, SvsMetadata};
use crate::format::{detect_format, detect_vendor, SlideFormat};
use crate::format::tiff::{
    best_level_for_downsample, Compression, Ifd, IfdEntry, ImageLayout, TiffHeader, TiffPyramid, TiffTag, TileData,
    ValueReader, STRING_PROPERTY_TAGS,
};
use crate::io::{BlockCache, FileRangeReader, RangeReader};

use super::cache::{DecodedTile, TileCache, TileCacheKey};
use super::region::{chunk_span, composite, premultiply, Viewport};
use super::{
    associated_property, level_property, Engine, EngineSlide, PROPERTY_NAME_BOUNDS_HEIGHT,
    PROPERTY_NAME_BOUNDS_WIDTH, PROPERTY_NAME_BOUNDS_X, PROPERTY_NAME_BOUNDS_Y, PROPERTY_NAME_COMMENT,
    PROPERTY_NAME_ICC_SIZE, PROPERTY_NAME_LEVEL_COUNT, PROPERTY_NAME_MPP_X, PROPERTY_NAME_MPP_Y,
    PROPERTY_NAME_OBJECTIVE_POWER, PROPERTY_NAME_QUICKHASH1, PROPERTY_NAME_VENDOR,
};

/// Largest lowest-resolution level (in stored bytes) hashed into
/// `openslide.quickhash-1`
const QUICKHASH_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// ResolutionUnit values
const RESOLUTION_UNIT_NONE: u32 = 1;
const RESOLUTION_UNIT_INCH: u32 = 2;
const RESOLUTION_UNIT_CENTIMETER: u32 = 3;

static NEXT_SLIDE_ID: AtomicU64 = AtomicU64::new(1);

type SlideReader = BlockCache<FileRangeReader>;

// =============================================================================
// TiffEngine
// =============================================================================

/// The built-in engine for Aperio SVS and generic pyramidal TIFF.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffEngine;

impl Engine for TiffEngine {
    type Slide = TiffSlide;

    fn open(&self, path: &Path) -> TiffSlide {
        TiffSlide::open(path)
    }

    fn detect_vendor(&self, path: &Path) -> Option<String> {
        detect_vendor(path).map(str::to_string)
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

// =============================================================================
// Stored Images
// =============================================================================

/// An image stored as a grid of chunks, with its chunk locations loaded.
struct StoredImage {
    layout: ImageLayout,
    chunks: TileData,
}

impl StoredImage {
    fn load(reader: &SlideReader, header: &TiffHeader, layout: ImageLayout) -> Result<Self, TiffError> {
        let chunks = TileData::load(reader, &layout, header)?;
        Ok(Self { layout, chunks })
    }

    /// Bytes of the chunk table entries actually used by the grid.
    fn stored_bytes(&self) -> u64 {
        self.chunks
            .byte_counts
            .iter()
            .take(self.layout.chunk_count() as usize)
            .fold(0u64, |total, &count| total.saturating_add(count))
    }

    /// Read and decode one chunk to premultiplied ARGB.
    fn decode_chunk(&self, reader: &SlideReader, chunk_x: u32, chunk_y: u32) -> Result<DecodedTile, TiffError> {
        let layout = &self.layout;
        let (offset, size) = layout
            .chunk_index(chunk_x, chunk_y)
            .and_then(|index| self.chunks.get_tile_location(index))
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!("no chunk at ({}, {})", chunk_x, chunk_y),
            })?;

        // Sparse chunks are left transparent
        if size == 0 {
            return Ok(DecodedTile {
                width: layout.chunk_width,
                height: layout.chunk_height,
                pixels: vec![0u32; layout.chunk_width as usize * layout.chunk_height as usize].into(),
            });
        }

        let size = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: "TileByteCounts",
            message: format!("chunk of {} bytes is too large", size),
        })?;
        let data = reader.read_exact_at(offset, size)?;

        match Compression::from_u16(layout.compression) {
            Some(Compression::Jpeg) => {
                let image = decode_tile(self.chunks.jpeg_tables.as_deref(), &data)?;
                let pixels: Vec<u32> = image.pixels().map(|p| premultiply(p.0)).collect();
                Ok(DecodedTile {
                    width: image.width(),
                    height: image.height(),
                    pixels: pixels.into(),
                })
            }
            Some(Compression::None) => {
                layout.check_decodable()?;
                Ok(decode_uncompressed(&data, layout.chunk_width, layout.samples_per_pixel))
            }
            Some(other) => Err(TiffError::UnsupportedCompression(other.name().to_string())),
            None => Err(TiffError::UnsupportedCompression(layout.compression.to_string())),
        }
    }

    /// Decode every chunk into a `width * height` buffer.
    fn decode_whole(&self, reader: &SlideReader, dest: &mut [u32]) -> Result<(), TiffError> {
        let layout = &self.layout;
        let viewport = Viewport {
            x: 0,
            y: 0,
            width: layout.width as i64,
            height: layout.height as i64,
        };
        for chunk_y in 0..layout.chunks_y {
            for chunk_x in 0..layout.chunks_x {
                let tile = self.decode_chunk(reader, chunk_x, chunk_y)?;
                let (visible_w, visible_h) = layout.chunk_dimensions(chunk_x, chunk_y).unwrap_or((0, 0));
                composite(
                    dest,
                    viewport,
                    &tile,
                    chunk_x as i64 * layout.chunk_width as i64,
                    chunk_y as i64 * layout.chunk_height as i64,
                    visible_w,
                    visible_h,
                );
            }
        }
        Ok(())
    }
}

/// Decode uncompressed 8-bit chunky samples (gray, RGB or RGBA).
///
/// A short final strip yields as many whole rows as the data holds.
fn decode_uncompressed(data: &[u8], width: u32, samples_per_pixel: u32) -> DecodedTile {
    let samples = samples_per_pixel.max(1) as usize;
    let stride = width as usize * samples;
    let rows = if stride == 0 { 0 } else { data.len() / stride };

    let pixels: Vec<u32> = data[..rows * stride]
        .chunks_exact(samples)
        .map(|px| match *px {
            [v] => premultiply([v, v, v, 255]),
            [r, g, b] => premultiply([r, g, b, 255]),
            [r, g, b, a] => premultiply([r, g, b, a]),
            _ => 0,
        })
        .collect();

    DecodedTile {
        width,
        height: rows as u32,
        pixels: pixels.into(),
    }
}

/// Size in bytes of a profile entry, 0 when absent.
fn profile_size(entry: Option<&IfdEntry>) -> i64 {
    entry
        .and_then(IfdEntry::value_byte_size)
        .and_then(|size| i64::try_from(size).ok())
        .unwrap_or(0)
}

// =============================================================================
// Slide Data
// =============================================================================

struct Level {
    downsample: f64,
    image: StoredImage,
}

struct AssociatedImage {
    name: String,
    image: StoredImage,
}

/// Everything a healthy slide serves reads from.
struct SlideData {
    reader: SlideReader,
    header: TiffHeader,
    format: SlideFormat,
    levels: Vec<Level>,
    associated: Vec<AssociatedImage>,
    properties: BTreeMap<String, String>,
}

impl SlideData {
    fn load(path: &Path) -> Result<Self, FormatError> {
        let reader = BlockCache::new(FileRangeReader::open(path)?);
        let format = detect_format(&reader)?;
        let (header, ifds) = TiffPyramid::read_ifds(&reader)?;

        let descriptions = read_descriptions(&reader, &header, &ifds);
        let associated_ifds = match format {
            SlideFormat::AperioSvs => svs::associated_images(&descriptions),
            SlideFormat::GenericTiff => Vec::new(),
        };
        let excluded: Vec<usize> = associated_ifds.iter().map(|(_, index)| *index).collect();
        let pyramid = TiffPyramid::from_ifds(header, ifds, &excluded);

        let base = pyramid
            .base_level()
            .ok_or_else(|| TiffError::UnsupportedLayout("no tiled pyramid levels".to_string()))?;
        base.layout.check_decodable()?;
        let base_ifd_index = base.layout.ifd_index;

        let mut levels = Vec::with_capacity(pyramid.level_count());
        for level in &pyramid.levels {
            levels.push(Level {
                downsample: level.downsample,
                image: StoredImage::load(&reader, &header, level.layout.clone())?,
            });
        }

        let mut associated = Vec::new();
        for (name, index) in associated_ifds {
            let Some(layout) = pyramid
                .ifds
                .get(index)
                .and_then(|ifd| ImageLayout::from_ifd(ifd, index, header.byte_order))
            else {
                debug!(name, index, "associated image has no readable layout");
                continue;
            };
            if let Err(e) = layout.check_decodable() {
                debug!(name, error = %e, "skipping undecodable associated image");
                continue;
            }
            associated.push(AssociatedImage {
                name: name.to_string(),
                image: StoredImage::load(&reader, &header, layout)?,
            });
        }

        let mut data = SlideData {
            reader,
            header,
            format,
            levels,
            associated,
            properties: BTreeMap::new(),
        };

        if let Some(base_ifd) = pyramid.ifds.get(base_ifd_index) {
            let description = descriptions.get(base_ifd_index).cloned().flatten();
            data.properties = data.collect_properties(base_ifd, description.as_deref())?;
        }

        Ok(data)
    }

    /// Build the property map: `tiff.*` from the base IFD, `aperio.*` from
    /// the SVS description, and the engine's `openslide.*` keys.
    fn collect_properties(
        &self,
        base_ifd: &Ifd,
        description: Option<&str>,
    ) -> Result<BTreeMap<String, String>, TiffError> {
        let mut properties = BTreeMap::new();
        let values = ValueReader::new(&self.reader, &self.header);

        for tag in STRING_PROPERTY_TAGS {
            let (Some(name), Some(entry)) = (tag.property_name(), base_ifd.get_entry_by_tag(tag)) else {
                continue;
            };
            match values.read_string(entry) {
                Ok(value) => {
                    properties.insert(format!("tiff.{}", name), value);
                }
                Err(e) => debug!(tag = name, error = %e, "unreadable string tag"),
            }
        }

        let resolution = Resolution::read(&values, base_ifd);
        resolution.insert_properties(&mut properties);

        if let Some(description) = description {
            properties.insert(PROPERTY_NAME_COMMENT.to_string(), description.to_string());
        }

        properties.insert(PROPERTY_NAME_VENDOR.to_string(), self.format.vendor().to_string());

        let mut mpp = resolution.mpp();
        let mut objective_power = None;
        if self.format == SlideFormat::AperioSvs {
            let metadata = SvsMetadata::parse(description.unwrap_or_default());
            for (key, value) in &metadata.properties {
                properties.insert(format!("aperio.{}", key), value.clone());
            }
            if metadata.mpp.is_some() {
                let raw = metadata.properties.get("MPP").cloned();
                mpp = raw.clone().zip(raw);
            }
            if metadata.magnification.is_some() {
                objective_power = metadata.properties.get("AppMag").cloned();
            }
        }
        if let Some((mpp_x, mpp_y)) = mpp {
            properties.insert(PROPERTY_NAME_MPP_X.to_string(), mpp_x);
            properties.insert(PROPERTY_NAME_MPP_Y.to_string(), mpp_y);
        }
        if let Some(power) = objective_power {
            properties.insert(PROPERTY_NAME_OBJECTIVE_POWER.to_string(), power);
        }

        // The whole base level is the slide's non-empty area
        if let Some(base) = self.levels.first() {
            let layout = &base.image.layout;
            properties.insert(PROPERTY_NAME_BOUNDS_X.to_string(), "0".to_string());
            properties.insert(PROPERTY_NAME_BOUNDS_Y.to_string(), "0".to_string());
            properties.insert(PROPERTY_NAME_BOUNDS_WIDTH.to_string(), layout.width.to_string());
            properties.insert(PROPERTY_NAME_BOUNDS_HEIGHT.to_string(), layout.height.to_string());
        }

        properties.insert(PROPERTY_NAME_LEVEL_COUNT.to_string(), self.levels.len().to_string());
        for (index, level) in self.levels.iter().enumerate() {
            let layout = &level.image.layout;
            properties.insert(level_property(index, "width"), layout.width.to_string());
            properties.insert(level_property(index, "height"), layout.height.to_string());
            properties.insert(level_property(index, "downsample"), level.downsample.to_string());
            properties.insert(level_property(index, "tile-width"), layout.chunk_width.to_string());
            properties.insert(level_property(index, "tile-height"), layout.chunk_height.to_string());
        }

        for image in &self.associated {
            let layout = &image.image.layout;
            properties.insert(associated_property(&image.name, "width"), layout.width.to_string());
            properties.insert(associated_property(&image.name, "height"), layout.height.to_string());
            let icc_size = profile_size(layout.icc_profile_entry.as_ref());
            if icc_size > 0 {
                properties.insert(associated_property(&image.name, "icc-size"), icc_size.to_string());
            }
        }

        let icc_size = self.icc_profile_size();
        if icc_size > 0 {
            properties.insert(PROPERTY_NAME_ICC_SIZE.to_string(), icc_size.to_string());
        }

        if let Some(hash) = self.quickhash(&properties)? {
            properties.insert(PROPERTY_NAME_QUICKHASH1.to_string(), hash);
        }

        Ok(properties)
    }

    /// SHA-256 over the properties and the raw chunks of the smallest level.
    ///
    /// None when that level stores more than `QUICKHASH_MAX_BYTES`.
    fn quickhash(&self, properties: &BTreeMap<String, String>) -> Result<Option<String>, TiffError> {
        let Some(level) = self.levels.last() else {
            return Ok(None);
        };
        if level.image.stored_bytes() > QUICKHASH_MAX_BYTES {
            debug!("smallest level too large for quickhash");
            return Ok(None);
        }

        let mut hasher = Sha256::new();
        for (key, value) in properties {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }

        for index in 0..level.image.layout.chunk_count() {
            let Some((offset, size)) = level.image.chunks.get_tile_location(index) else {
                break;
            };
            if size > 0 {
                // Bounded by QUICKHASH_MAX_BYTES above
                let chunk = self.reader.read_exact_at(offset, size as usize)?;
                hasher.update(&chunk);
            }
        }

        Ok(Some(hex::encode(hasher.finalize())))
    }

    fn icc_profile_size(&self) -> i64 {
        self.levels
            .first()
            .map(|level| profile_size(level.image.layout.icc_profile_entry.as_ref()))
            .unwrap_or(0)
    }

    /// Read the profile stored in `entry` into `dest`.
    fn read_profile(&self, entry: &IfdEntry, dest: &mut [u8]) -> Result<(), String> {
        let profile = ValueReader::new(&self.reader, &self.header)
            .read_raw_bytes(entry)
            .map_err(|e| e.to_string())?;
        if dest.len() < profile.len() {
            return Err(format!(
                "Destination buffer too small: need {} bytes, got {}",
                profile.len(),
                dest.len()
            ));
        }
        dest[..profile.len()].copy_from_slice(&profile);
        Ok(())
    }
}

/// ImageDescription of every IFD, None where absent or unreadable.
fn read_descriptions(reader: &SlideReader, header: &TiffHeader, ifds: &[Ifd]) -> Vec<Option<String>> {
    let values = ValueReader::new(reader, header);
    ifds.iter()
        .map(|ifd| {
            ifd.get_entry_by_tag(TiffTag::ImageDescription)
                .and_then(|entry| values.read_string(entry).ok())
        })
        .collect()
}

// =============================================================================
// Resolution
// =============================================================================

/// Baseline resolution tags of the base IFD.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Resolution {
    x: Option<f64>,
    y: Option<f64>,
    unit: u32,
}

impl Resolution {
    fn read<R: RangeReader>(values: &ValueReader<'_, R>, ifd: &Ifd) -> Self {
        let rational = |tag| {
            ifd.get_entry_by_tag(tag)
                .and_then(|entry| values.read_rational(entry).ok())
                .filter(|value| *value > 0.0)
        };
        Resolution {
            x: rational(TiffTag::XResolution),
            y: rational(TiffTag::YResolution),
            unit: ifd
                .get_entry_by_tag(TiffTag::ResolutionUnit)
                .and_then(|entry| values.read_u32(entry).ok())
                .unwrap_or(RESOLUTION_UNIT_INCH),
        }
    }

    fn unit_name(&self) -> Option<&'static str> {
        match self.unit {
            RESOLUTION_UNIT_NONE => Some("none"),
            RESOLUTION_UNIT_INCH => Some("inch"),
            RESOLUTION_UNIT_CENTIMETER => Some("centimeter"),
            _ => None,
        }
    }

    fn insert_properties(&self, properties: &mut BTreeMap<String, String>) {
        if let Some(x) = self.x {
            properties.insert("tiff.XResolution".to_string(), x.to_string());
        }
        if let Some(y) = self.y {
            properties.insert("tiff.YResolution".to_string(), y.to_string());
        }
        if self.x.is_some() || self.y.is_some() {
            if let Some(unit) = self.unit_name() {
                properties.insert("tiff.ResolutionUnit".to_string(), unit.to_string());
            }
        }
    }

    /// Microns per pixel on each axis, when both resolutions have a physical unit.
    fn mpp(&self) -> Option<(String, String)> {
        let microns_per_unit = match self.unit {
            RESOLUTION_UNIT_CENTIMETER => 10_000.0,
            RESOLUTION_UNIT_INCH => 25_400.0,
            _ => return None,
        };
        let (x, y) = (self.x?, self.y?);
        Some(((microns_per_unit / x).to_string(), (microns_per_unit / y).to_string()))
    }
}

// =============================================================================
// TiffSlide
// =============================================================================

/// A slide opened by [`TiffEngine`].
pub struct TiffSlide {
    /// Unique per slide; keys this slide's tiles in a shared cache
    id: u64,
    path: PathBuf,
    error: Mutex<Option<String>>,
    data: Option<SlideData>,
    cache: Arc<TileCache>,
}

impl TiffSlide {
    /// Open `path`. Failures are latched, never returned.
    pub fn open(path: &Path) -> Self {
        let mut slide = TiffSlide {
            id: NEXT_SLIDE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            error: Mutex::new(None),
            data: None,
            cache: Arc::new(TileCache::new()),
        };

        match SlideData::load(path) {
            Ok(data) => {
                debug!(
                    path = %path.display(),
                    vendor = data.format.vendor(),
                    levels = data.levels.len(),
                    associated = data.associated.len(),
                    "opened slide"
                );
                slide.data = Some(data);
            }
            Err(e) => slide.fail(open_failure_message(path, &e)),
        }

        slide
    }

    /// Path the slide was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Vendor of an opened slide.
    pub fn vendor(&self) -> Option<&'static str> {
        self.data.as_ref().map(|data| data.format.vendor())
    }

    fn lock_error(&self) -> MutexGuard<'_, Option<String>> {
        self.error.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Latch `message` unless an error is already latched.
    fn fail(&self, message: impl Into<String>) {
        let mut error = self.lock_error();
        if error.is_none() {
            let message = message.into();
            debug!(path = %self.path.display(), error = %message, "engine error latched");
            *error = Some(message);
        }
    }

    /// Slide data while no error is latched.
    fn healthy(&self) -> Option<&SlideData> {
        if self.lock_error().is_some() {
            return None;
        }
        self.data.as_ref()
    }

    fn level(&self, level: i32) -> Option<(&SlideData, usize, &Level)> {
        let data = self.healthy()?;
        let found = usize::try_from(level)
            .ok()
            .and_then(|index| data.levels.get(index).map(|l| (index, l)));
        match found {
            Some((index, l)) => Some((data, index, l)),
            None => {
                self.fail(format!("Invalid level {}", level));
                None
            }
        }
    }

    fn associated(&self, name: &str) -> Option<(&SlideData, &AssociatedImage)> {
        let data = self.healthy()?;
        match data.associated.iter().find(|image| image.name == name) {
            Some(image) => Some((data, image)),
            None => {
                self.fail(format!("Unknown associated image: {}", name));
                None
            }
        }
    }

    /// Decoded tile, from the cache when present.
    fn tile(&self, data: &SlideData, level_index: usize, level: &Level, chunk_x: u32, chunk_y: u32) -> Result<DecodedTile, TiffError> {
        let key = TileCacheKey::new(self.id, level_index as u32, chunk_x, chunk_y);
        if let Some(tile) = self.cache.get(&key) {
            return Ok(tile);
        }
        let tile = level.image.decode_chunk(&data.reader, chunk_x, chunk_y)?;
        self.cache.put(key, tile.clone());
        Ok(tile)
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_region(
        &self,
        data: &SlideData,
        level_index: usize,
        level: &Level,
        dest: &mut [u32],
        x: i64,
        y: i64,
        w: i64,
        h: i64,
    ) -> Result<(), TiffError> {
        let layout = &level.image.layout;
        let viewport = Viewport {
            x: (x as f64 / level.downsample).floor() as i64,
            y: (y as f64 / level.downsample).floor() as i64,
            width: w,
            height: h,
        };

        let (Some(columns), Some(rows)) = (
            chunk_span(viewport.x, w, layout.width, layout.chunk_width),
            chunk_span(viewport.y, h, layout.height, layout.chunk_height),
        ) else {
            return Ok(());
        };

        for chunk_y in rows {
            for chunk_x in columns.clone() {
                let tile = self.tile(data, level_index, level, chunk_x, chunk_y)?;
                let (visible_w, visible_h) = layout.chunk_dimensions(chunk_x, chunk_y).unwrap_or((0, 0));
                composite(
                    dest,
                    viewport,
                    &tile,
                    chunk_x as i64 * layout.chunk_width as i64,
                    chunk_y as i64 * layout.chunk_height as i64,
                    visible_w,
                    visible_h,
                );
            }
        }
        Ok(())
    }
}

/// Message latched when a slide cannot be opened.
fn open_failure_message(path: &Path, err: &FormatError) -> String {
    match err {
        FormatError::Io(io) => io.to_string(),
        FormatError::UnsupportedFormat { .. } => {
            format!("Unrecognized file format: {}", path.display())
        }
        FormatError::Tiff(tiff) => {
            format!("Failed to open slide file {}: {}", path.display(), tiff)
        }
    }
}

/// Pixel count of a `w x h` buffer, None when negative or unrepresentable.
fn pixel_count(w: i64, h: i64) -> Option<usize> {
    if w < 0 || h < 0 {
        return None;
    }
    w.checked_mul(h).and_then(|n| usize::try_from(n).ok())
}

impl Drop for TiffSlide {
    fn drop(&mut self) {
        self.cache.remove_slide(self.id);
    }
}

impl std::fmt::Debug for TiffSlide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffSlide")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("vendor", &self.vendor())
            .field("error", &*self.lock_error())
            .finish()
    }
}

impl EngineSlide for TiffSlide {
    fn error(&self) -> Option<String> {
        self.lock_error().clone()
    }

    fn level_count(&self) -> i32 {
        self.healthy().map(|data| data.levels.len() as i32).unwrap_or(-1)
    }

    fn level_dimensions(&self, level: i32) -> (i64, i64) {
        self.level(level)
            .map(|(_, _, l)| (l.image.layout.width as i64, l.image.layout.height as i64))
            .unwrap_or((-1, -1))
    }

    fn level_downsample(&self, level: i32) -> f64 {
        self.level(level).map(|(_, _, l)| l.downsample).unwrap_or(-1.0)
    }

    fn best_level_for_downsample(&self, downsample: f64) -> i32 {
        let Some(data) = self.healthy() else {
            return -1;
        };
        best_level_for_downsample(data.levels.iter().map(|level| level.downsample), downsample) as i32
    }

    fn read_region(&self, dest: &mut [u32], x: i64, y: i64, level: i32, w: i64, h: i64) {
        dest.fill(0);

        if w < 0 || h < 0 {
            self.fail(format!(
                "Negative width ({}) or negative height ({}) not allowed",
                w, h
            ));
            return;
        }
        let Some((data, level_index, lvl)) = self.level(level) else {
            return;
        };
        let needed = match pixel_count(w, h) {
            Some(n) if n <= dest.len() => n,
            _ => {
                self.fail(format!(
                    "Destination buffer too small: need {}x{} pixels, got {}",
                    w,
                    h,
                    dest.len()
                ));
                return;
            }
        };

        let dest = &mut dest[..needed];
        if let Err(e) = self.paint_region(data, level_index, lvl, dest, x, y, w, h) {
            dest.fill(0);
            self.fail(e.to_string());
        }
    }

    fn property_names(&self) -> Vec<String> {
        self.healthy()
            .map(|data| data.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn property_value(&self, name: &str) -> Option<String> {
        self.healthy()?.properties.get(name).cloned()
    }

    fn associated_image_names(&self) -> Vec<String> {
        self.healthy()
            .map(|data| data.associated.iter().map(|image| image.name.clone()).collect())
            .unwrap_or_default()
    }

    fn associated_image_dimensions(&self, name: &str) -> (i64, i64) {
        self.associated(name)
            .map(|(_, image)| (image.image.layout.width as i64, image.image.layout.height as i64))
            .unwrap_or((-1, -1))
    }

    fn read_associated_image(&self, name: &str, dest: &mut [u32]) {
        dest.fill(0);

        let Some((data, image)) = self.associated(name) else {
            return;
        };
        let layout = &image.image.layout;
        let needed = match pixel_count(layout.width as i64, layout.height as i64) {
            Some(n) if n <= dest.len() => n,
            _ => {
                self.fail(format!(
                    "Destination buffer too small: need {}x{} pixels, got {}",
                    layout.width,
                    layout.height,
                    dest.len()
                ));
                return;
            }
        };

        let dest = &mut dest[..needed];
        if let Err(e) = image.image.decode_whole(&data.reader, dest) {
            dest.fill(0);
            self.fail(e.to_string());
        }
    }

    fn icc_profile_size(&self) -> i64 {
        self.healthy().map(SlideData::icc_profile_size).unwrap_or(-1)
    }

    fn read_icc_profile(&self, dest: &mut [u8]) {
        let Some(data) = self.healthy() else {
            return;
        };
        let entry = data
            .levels
            .first()
            .and_then(|level| level.image.layout.icc_profile_entry.as_ref());
        if let Some(entry) = entry {
            if let Err(message) = data.read_profile(entry, dest) {
                self.fail(message);
            }
        }
    }

    fn associated_image_icc_profile_size(&self, name: &str) -> i64 {
        self.associated(name)
            .map(|(_, image)| profile_size(image.image.layout.icc_profile_entry.as_ref()))
            .unwrap_or(-1)
    }

    fn read_associated_image_icc_profile(&self, name: &str, dest: &mut [u8]) {
        let Some((data, image)) = self.associated(name) else {
            return;
        };
        if let Some(entry) = image.image.layout.icc_profile_entry.as_ref() {
            if let Err(message) = data.read_profile(entry, dest) {
                self.fail(message);
            }
        }
    }

    fn set_cache(&mut self, cache: Arc<TileCache>) {
        self.cache.remove_slide(self.id);
        self.cache = cache;
    }
}

// =============================================================================
// Tests
// =============================================================================
