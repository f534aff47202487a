//! Region compositing.
//!
//! A region read touches a rectangle of tiles. Each decoded tile is copied
//! into the destination where the two overlap; pixels the image does not
//! cover stay transparent.
//!
//! Pixels are premultiplied ARGB packed into a native `u32`
//! (`0xAARRGGBB`), the layout cairo-style compositors expect.

use std::ops::Range;

use super::cache::DecodedTile;

// =============================================================================
// Pixel Conversion
// =============================================================================

/// Pack an 8-bit RGBA pixel as premultiplied ARGB.
#[inline]
pub fn premultiply([r, g, b, a]: [u8; 4]) -> u32 {
    let a32 = a as u32;
    let scale = |c: u8| -> u32 {
        if a == 255 {
            c as u32
        } else {
            (c as u32 * a32 + 127) / 255
        }
    };
    (a32 << 24) | (scale(r) << 16) | (scale(g) << 8) | scale(b)
}

/// Unpack a premultiplied ARGB pixel into straight 8-bit RGBA.
#[inline]
pub fn unpremultiply(argb: u32) -> [u8; 4] {
    let a = (argb >> 24) as u8;
    let channel = |shift: u32| -> u8 {
        let c = (argb >> shift) & 0xFF;
        match a {
            0 => 0,
            255 => c as u8,
            _ => ((c * 255 + a as u32 / 2) / a as u32).min(255) as u8,
        }
    };
    [channel(16), channel(8), channel(0), a]
}

// =============================================================================
// Tile Selection
// =============================================================================

/// Chunk indices along one axis that a span of `len` pixels starting at
/// `start` touches, for an image `extent` pixels long cut into `chunk`-pixel
/// pieces.
///
/// Returns None when the span lies entirely outside the image.
pub(crate) fn chunk_span(start: i64, len: i64, extent: u32, chunk: u32) -> Option<Range<u32>> {
    if len <= 0 || chunk == 0 {
        return None;
    }
    let first = start.max(0);
    let last = start.saturating_add(len).min(extent as i64);
    if first >= last {
        return None;
    }
    let chunk = chunk as i64;
    Some((first / chunk) as u32..((last - 1) / chunk + 1) as u32)
}

// =============================================================================
// Compositing
// =============================================================================

/// Destination rectangle of a region read, in level pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Viewport {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Copy the part of `tile` that overlaps `viewport` into `dest`.
///
/// The tile's top-left pixel sits at `(origin_x, origin_y)`; only the first
/// `visible_width x visible_height` pixels belong to the image (edge tiles
/// are padded).
pub(crate) fn composite(
    dest: &mut [u32],
    viewport: Viewport,
    tile: &DecodedTile,
    origin_x: i64,
    origin_y: i64,
    visible_width: u32,
    visible_height: u32,
) {
    let tile_w = visible_width.min(tile.width) as i64;
    let tile_h = visible_height.min(tile.height) as i64;

    let left = origin_x.max(viewport.x);
    let right = (origin_x + tile_w).min(viewport.x + viewport.width);
    let top = origin_y.max(viewport.y);
    let bottom = (origin_y + tile_h).min(viewport.y + viewport.height);
    if left >= right || top >= bottom {
        return;
    }

    let span = (right - left) as usize;
    for y in top..bottom {
        let src_start = ((y - origin_y) * tile.width as i64 + (left - origin_x)) as usize;
        let dst_start = ((y - viewport.y) * viewport.width + (left - viewport.x)) as usize;
        dest[dst_start..dst_start + span].copy_from_slice(&tile.pixels[src_start..src_start + span]);
    }
}

// =============================================================================
// Tests
// =============================================================================
