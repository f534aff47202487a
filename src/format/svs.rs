//! Aperio SVS specifics.
//!
//! # SVS File Structure
//!
//! SVS files are TIFF files containing:
//! - **Pyramid levels**: IFD 0 at full resolution, then progressively smaller tiled IFDs
//! - **Thumbnail**: always IFD 1
//! - **Label / Macro**: IFDs whose ImageDescription has a line starting with
//!   `label` or `macro`
//!
//! # Metadata
//!
//! The level 0 ImageDescription is a pipe-separated string:
//!
//! ```text
//! Aperio Image Library v12.0.15
//! 46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499|...
//! ```
//!
//! The first part is a free-form header; every later part is a `key = value`
//! pair surfaced as an `aperio.<key>` property.

use std::collections::BTreeMap;

// =============================================================================
// SVS Metadata
// =============================================================================

/// Parsed metadata from an SVS ImageDescription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SvsMetadata {
    /// Microns per pixel (resolution)
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// Key-value pairs in description order of appearance, sorted by key
    pub properties: BTreeMap<String, String>,
}

impl SvsMetadata {
    /// Parse metadata from an ImageDescription string.
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata::default();

        // Skip the free-form header before the first pipe
        for part in description.split('|').skip(1) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }

            match key {
                "MPP" => metadata.mpp = value.parse::<f64>().ok(),
                "AppMag" => metadata.magnification = value.parse::<f64>().ok(),
                _ => {}
            }

            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }
}

// =============================================================================
// Associated Images
// =============================================================================

/// IFD index of the thumbnail in SVS files
const THUMBNAIL_IFD: usize = 1;

/// Name of the associated image stored in an IFD, based on its description.
///
/// Returns `label` or `macro` when a description line starts with that word.
pub fn associated_name_from_description(description: &str) -> Option<&'static str> {
    description.lines().find_map(|line| {
        let line = line.trim_start().to_ascii_lowercase();
        if line.starts_with("label") {
            Some("label")
        } else if line.starts_with("macro") {
            Some("macro")
        } else {
            None
        }
    })
}

/// Assign associated-image names to SVS IFDs.
///
/// `descriptions[i]` is the ImageDescription of IFD `i`, if any. Returns
/// `(name, ifd_index)` pairs; the first IFD to claim a name keeps it.
pub fn associated_images(descriptions: &[Option<String>]) -> Vec<(&'static str, usize)> {
    let mut images: Vec<(&'static str, usize)> = Vec::new();

    for (index, description) in descriptions.iter().enumerate() {
        let name = description
            .as_deref()
            .and_then(associated_name_from_description)
            .or(if index == THUMBNAIL_IFD {
                Some("thumbnail")
            } else {
                None
            });

        if let Some(name) = name {
            if index != 0 && !images.iter().any(|(existing, _)| *existing == name) {
                images.push((name, index));
            }
        }
    }

    images
}

// =============================================================================
// Tests
// =============================================================================
