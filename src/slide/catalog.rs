//! Property catalog synthesis.
//!
//! Engines expose a flat list of vendor and engine properties. A slide's
//! catalog keeps every one of them verbatim and adds a normalized `wsi.`
//! namespace:
//!
//! | Key | Source |
//! |-----|--------|
//! | `wsi.level-count` | engine level count |
//! | `wsi.level[<i>].width` / `.height` / `.downsample` | engine geometry |
//! | `wsi.associated-image[<name>].width` / `.height` | associated image size |
//! | `wsi.associated-image[<name>].icc-size` | only when the profile is non-empty |
//! | `wsi.icc-size` | only when the slide profile is non-empty |
//! | `wsi.<suffix>` for each [`WELL_KNOWN`] suffix | engine `openslide.<suffix>` |
//!
//! Numbers use Rust's shortest round-trip formatting (`1`, `4`, `4.0003`).

use std::collections::BTreeMap;

use crate::engine::{EngineSlide, PROPERTY_NAMESPACE};

/// Namespace of the keys a slide handle synthesizes.
pub const NAMESPACE: &str = "wsi.";

/// Namespace of the engine's own keys, mirrored under [`NAMESPACE`].
pub const ENGINE_NAMESPACE: &str = PROPERTY_NAMESPACE;

/// Number of pyramid levels.
pub const LEVEL_COUNT: &str = "wsi.level-count";

/// Size in bytes of the slide's ICC profile.
pub const ICC_SIZE: &str = "wsi.icc-size";

/// Scalar properties re-read from the engine for every catalog.
pub const WELL_KNOWN: [&str; 11] = [
    "vendor",
    "background-color",
    "bounds-height",
    "bounds-width",
    "bounds-x",
    "bounds-y",
    "comment",
    "mpp-x",
    "mpp-y",
    "objective-power",
    "quickhash-1",
];

/// `wsi.<suffix>`
pub fn key(suffix: &str) -> String {
    format!("{}{}", NAMESPACE, suffix)
}

/// `wsi.level[<level>].width`
pub fn level_width(level: i32) -> String {
    format!("{}level[{}].width", NAMESPACE, level)
}

/// `wsi.level[<level>].height`
pub fn level_height(level: i32) -> String {
    format!("{}level[{}].height", NAMESPACE, level)
}

/// `wsi.level[<level>].downsample`
pub fn level_downsample(level: i32) -> String {
    format!("{}level[{}].downsample", NAMESPACE, level)
}

/// `wsi.associated-image[<name>].width`
pub fn associated_width(name: &str) -> String {
    format!("{}associated-image[{}].width", NAMESPACE, name)
}

/// `wsi.associated-image[<name>].height`
pub fn associated_height(name: &str) -> String {
    format!("{}associated-image[{}].height", NAMESPACE, name)
}

/// `wsi.associated-image[<name>].icc-size`
pub fn associated_icc_size(name: &str) -> String {
    format!("{}associated-image[{}].icc-size", NAMESPACE, name)
}

/// The `wsi.` alias of an engine key, if it is in the engine namespace.
pub fn normalized(engine_key: &str) -> Option<String> {
    engine_key
        .strip_prefix(ENGINE_NAMESPACE)
        .filter(|suffix| !suffix.is_empty())
        .map(key)
}

/// Build the full catalog from a healthy engine slide.
///
/// `vendor_fallback` supplies `wsi.vendor` when the engine exposes no vendor
/// property. The caller must re-check the engine's error slot afterwards: a
/// failing query leaves gaps rather than aborting.
pub(crate) fn synthesize<S: EngineSlide>(
    engine: &S,
    vendor_fallback: impl FnOnce() -> Option<String>,
) -> BTreeMap<String, String> {
    let mut catalog = raw_view(engine);

    let aliases: Vec<(String, String)> = catalog
        .iter()
        .filter_map(|(name, value)| normalized(name).map(|alias| (alias, value.clone())))
        .collect();
    catalog.extend(aliases);

    let level_count = engine.level_count();
    catalog.insert(LEVEL_COUNT.to_string(), level_count.to_string());
    for level in 0..level_count.max(0) {
        let (width, height) = engine.level_dimensions(level);
        catalog.insert(level_width(level), width.to_string());
        catalog.insert(level_height(level), height.to_string());
        catalog.insert(level_downsample(level), engine.level_downsample(level).to_string());
    }

    for name in engine.associated_image_names() {
        let (width, height) = engine.associated_image_dimensions(&name);
        catalog.insert(associated_width(&name), width.to_string());
        catalog.insert(associated_height(&name), height.to_string());

        let icc_size = engine.associated_image_icc_profile_size(&name);
        if icc_size > 0 {
            catalog.insert(associated_icc_size(&name), icc_size.to_string());
        }
    }

    let icc_size = engine.icc_profile_size();
    if icc_size > 0 {
        catalog.insert(ICC_SIZE.to_string(), icc_size.to_string());
    }

    for suffix in WELL_KNOWN {
        let engine_key = format!("{}{}", ENGINE_NAMESPACE, suffix);
        if let Some(value) = engine.property_value(&engine_key) {
            catalog.insert(key(suffix), value);
        }
    }
    let vendor = key("vendor");
    if !catalog.contains_key(&vendor) {
        if let Some(detected) = vendor_fallback() {
            catalog.insert(vendor, detected);
        }
    }

    catalog
}

/// Engine properties exactly as the engine names them; empty values skipped.
pub(crate) fn raw_view<S: EngineSlide>(engine: &S) -> BTreeMap<String, String> {
    engine
        .property_names()
        .into_iter()
        .filter_map(|name| {
            let value = engine.property_value(&name)?;
            (!value.is_empty()).then_some((name, value))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
