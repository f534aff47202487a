//! Built-in TIFF engine tests against synthetic slide files.

use std::path::Path;
use std::sync::Arc;

use wsi_slide::engine::TileCache;
use wsi_slide::{unpremultiply, Engine, EngineSlide, TiffEngine, TiffSlide};

use super::test_utils::{
    close_to, generic_pyramid, single_level, svs_slide, ByteOrderType, Codec, ImageSpec,
    TiffBuilder, LEVEL_COLORS, SVS_DESCRIPTION,
};

fn opaque([r, g, b]: [u8; 3]) -> u32 {
    0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

fn open(file: &tempfile::NamedTempFile) -> TiffSlide {
    let slide = TiffEngine.open(file.path());
    assert_eq!(slide.error(), None);
    slide
}

// =============================================================================
// Detection
// =============================================================================

#[test]
fn test_detect_vendor() {
    let svs = svs_slide().write_temp("svs");
    let tiff = generic_pyramid().write_temp("tiff");

    assert_eq!(TiffEngine.detect_vendor(svs.path()).as_deref(), Some("aperio"));
    assert_eq!(TiffEngine.detect_vendor(tiff.path()).as_deref(), Some("generic-tiff"));
    assert_eq!(TiffEngine.detect_vendor(Path::new("/no/such/file.svs")), None);
}

#[test]
fn test_stripped_tiff_is_unrecognized() {
    let file = TiffBuilder::new()
        .add_image(ImageSpec::solid_strip(64, 64, [1, 2, 3]))
        .write_temp("tif");

    let slide = TiffEngine.open(file.path());
    let message = slide.error().unwrap();
    assert_eq!(message, format!("Unrecognized file format: {}", file.path().display()));
    assert_eq!(TiffEngine.detect_vendor(file.path()), None);
}

#[test]
fn test_missing_file() {
    let slide = TiffEngine.open(Path::new("/no/such/file.svs"));
    let message = slide.error().unwrap();
    assert!(message.contains("/no/such/file.svs"));
    assert_eq!(slide.level_count(), -1);
}

// =============================================================================
// Generic TIFF
// =============================================================================

#[test]
fn test_generic_geometry() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);

    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.level0_dimensions(), (1024, 768));
    assert_eq!(slide.level_dimensions(1), (512, 384));
    assert_eq!(slide.level_dimensions(2), (256, 192));
    assert_eq!(slide.level_downsample(0), 1.0);
    assert_eq!(slide.level_downsample(1), 2.0);
    assert_eq!(slide.level_downsample(2), 4.0);

    assert_eq!(slide.best_level_for_downsample(1.0), 0);
    assert_eq!(slide.best_level_for_downsample(3.0), 1);
    assert_eq!(slide.best_level_for_downsample(100.0), 2);
    assert!(slide.associated_image_names().is_empty());
    assert_eq!(slide.error(), None);
}

#[test]
fn test_generic_properties() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);
    let value = |name: &str| slide.property_value(name);

    assert_eq!(value("openslide.vendor").as_deref(), Some("generic-tiff"));
    assert_eq!(value("tiff.Make").as_deref(), Some("Test Scanner"));
    assert_eq!(value("tiff.XResolution").as_deref(), Some("40000"));
    assert_eq!(value("tiff.ResolutionUnit").as_deref(), Some("centimeter"));
    assert_eq!(value("openslide.mpp-x").as_deref(), Some("0.25"));
    assert_eq!(value("openslide.mpp-y").as_deref(), Some("0.25"));
    assert_eq!(value("openslide.level-count").as_deref(), Some("3"));
    assert_eq!(value("openslide.level[1].downsample").as_deref(), Some("2"));
    assert_eq!(value("openslide.level[2].tile-width").as_deref(), Some("256"));
    assert_eq!(value("openslide.objective-power"), None);
    assert_eq!(value("openslide.icc-size"), None);

    let hash = value("openslide.quickhash-1").unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    let names = slide.property_names();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn test_quickhash_is_stable_across_opens() {
    let file = generic_pyramid().write_temp("tiff");
    let first = open(&file).property_value("openslide.quickhash-1");
    let second = open(&file).property_value("openslide.quickhash-1");
    assert!(first.is_some());
    assert_eq!(first, second);

    let other = single_level().write_temp("tiff");
    assert_ne!(open(&other).property_value("openslide.quickhash-1"), first);
}

#[test]
fn test_read_region_each_level() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);

    for (level, color) in LEVEL_COLORS.iter().enumerate() {
        let mut dest = vec![0u32; 16];
        slide.read_region(&mut dest, 0, 0, level as i32, 4, 4);
        assert_eq!(dest, vec![opaque(*color); 16], "level {}", level);
    }
    assert_eq!(slide.error(), None);
}

#[test]
fn test_read_region_level0_coordinates() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);

    // Level 2 is 256 wide; x = 1000 in level 0 is x = 250 in level 2
    let mut dest = vec![0xDEAD_BEEFu32; 10];
    slide.read_region(&mut dest, 1000, 0, 2, 10, 1);

    assert_eq!(&dest[..6], &[opaque(LEVEL_COLORS[2]); 6]);
    assert_eq!(&dest[6..], &[0; 4]);
}

#[test]
fn test_read_region_outside_image_is_transparent() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);

    let mut dest = vec![1u32; 9];
    slide.read_region(&mut dest, -10, -10, 0, 3, 3);
    assert_eq!(dest, vec![0; 9]);

    slide.read_region(&mut dest, 5000, 5000, 0, 3, 3);
    assert_eq!(dest, vec![0; 9]);

    // Straddling the top-left corner
    slide.read_region(&mut dest, -1, -1, 0, 3, 3);
    assert_eq!(dest[0], 0);
    assert_eq!(dest[4], opaque(LEVEL_COLORS[0]));
    assert_eq!(slide.error(), None);
}

#[test]
fn test_read_region_across_tiles() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);

    let mut dest = vec![0u32; 20 * 20];
    slide.read_region(&mut dest, 246, 246, 0, 20, 20);
    assert!(dest.iter().all(|&p| p == opaque(LEVEL_COLORS[0])));
}

#[test]
fn test_zero_sized_region() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);

    slide.read_region(&mut [], 0, 0, 0, 0, 0);
    assert_eq!(slide.error(), None);
}

#[test]
fn test_bigtiff_big_endian() {
    let file = generic_pyramid()
        .with_bigtiff(true)
        .with_byte_order(ByteOrderType::BigEndian)
        .write_temp("tiff");
    let slide = open(&file);

    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.level_dimensions(1), (512, 384));

    let mut dest = vec![0u32; 4];
    slide.read_region(&mut dest, 0, 0, 1, 2, 2);
    assert_eq!(dest, vec![opaque(LEVEL_COLORS[1]); 4]);
    assert_eq!(slide.property_value("openslide.mpp-x").as_deref(), Some("0.25"));
}

// =============================================================================
// Aperio SVS
// =============================================================================

#[test]
fn test_svs_structure() {
    let file = svs_slide().write_temp("svs");
    let slide = open(&file);

    assert_eq!(slide.level_count(), 2);
    assert_eq!(slide.level_dimensions(0), (1024, 768));
    assert_eq!(slide.level_dimensions(1), (256, 192));
    assert_eq!(slide.level_downsample(1), 4.0);
    assert_eq!(
        slide.associated_image_names(),
        vec!["thumbnail", "label", "macro"]
    );
    assert_eq!(slide.associated_image_dimensions("label"), (40, 30));
    assert_eq!(slide.associated_image_dimensions("macro"), (80, 30));
    assert_eq!(slide.associated_image_dimensions("thumbnail"), (64, 48));
}

#[test]
fn test_svs_properties() {
    let file = svs_slide().write_temp("svs");
    let slide = open(&file);
    let value = |name: &str| slide.property_value(name);

    assert_eq!(value("openslide.vendor").as_deref(), Some("aperio"));
    assert_eq!(value("openslide.comment").as_deref(), Some(SVS_DESCRIPTION));
    assert_eq!(value("tiff.ImageDescription").as_deref(), Some(SVS_DESCRIPTION));
    assert_eq!(value("aperio.AppMag").as_deref(), Some("20"));
    assert_eq!(value("aperio.Date").as_deref(), Some("12/29/09"));
    assert_eq!(value("aperio.ScanScope ID").as_deref(), Some("CPAPERIOCS"));
    assert_eq!(value("openslide.mpp-x").as_deref(), Some("0.4990"));
    assert_eq!(value("openslide.mpp-y").as_deref(), Some("0.4990"));
    assert_eq!(value("openslide.objective-power").as_deref(), Some("20"));
    assert_eq!(value("openslide.icc-size").as_deref(), Some("128"));
    assert_eq!(value("openslide.associated.label.width").as_deref(), Some("40"));
    assert_eq!(value("openslide.associated.macro.icc-size").as_deref(), Some("64"));
    assert_eq!(value("openslide.associated.label.icc-size"), None);
}

#[test]
fn test_svs_jpeg_with_shared_tables() {
    let file = svs_slide().write_temp("svs");
    let slide = open(&file);

    let mut dest = vec![0u32; 4];
    slide.read_region(&mut dest, 300, 300, 0, 2, 2);
    assert_eq!(slide.error(), None);
    for pixel in dest {
        assert!(
            close_to(unpremultiply(pixel), [220, 120, 160, 255], 10),
            "pixel {:08x}",
            pixel
        );
    }

    let mut dest = vec![0u32; 4];
    slide.read_region(&mut dest, 0, 764, 1, 2, 2);
    assert!(close_to(unpremultiply(dest[0]), [220, 120, 160, 255], 10));
    // Row 192 and below of the 256x192 level is padding
    assert_eq!(dest[2], 0);
}

#[test]
fn test_svs_icc_profiles() {
    let file = svs_slide().write_temp("svs");
    let slide = open(&file);

    assert_eq!(slide.icc_profile_size(), 128);
    let mut profile = vec![0u8; 128];
    slide.read_icc_profile(&mut profile);
    assert_eq!(profile, vec![0x5A; 128]);

    assert_eq!(slide.associated_image_icc_profile_size("label"), 0);
    assert_eq!(slide.associated_image_icc_profile_size("macro"), 64);
    let mut profile = vec![0u8; 64];
    slide.read_associated_image_icc_profile("macro", &mut profile);
    assert_eq!(profile, vec![0x11; 64]);
    assert_eq!(slide.error(), None);
}

#[test]
fn test_read_associated_image() {
    let file = svs_slide().write_temp("svs");
    let slide = open(&file);

    let mut dest = vec![0u32; 40 * 30];
    slide.read_associated_image("label", &mut dest);
    assert!(dest.iter().all(|&p| p == opaque([250, 250, 250])));

    let mut dest = vec![0u32; 64 * 48];
    slide.read_associated_image("thumbnail", &mut dest);
    assert!(dest.iter().all(|&p| p == opaque([10, 20, 30])));
    assert_eq!(slide.error(), None);
}

// =============================================================================
// Latched Errors
// =============================================================================

#[test]
fn test_invalid_level_latches_first_error() {
    let file = generic_pyramid().write_temp("tiff");
    let slide = open(&file);

    assert_eq!(slide.level_dimensions(5), (-1, -1));
    assert_eq!(slide.error().as_deref(), Some("Invalid level 5"));

    assert_eq!(slide.level_count(), -1);
    assert_eq!(slide.level_dimensions(0), (-1, -1));
    assert_eq!(slide.property_value("openslide.vendor"), None);

    slide.associated_image_dimensions("nope");
    assert_eq!(slide.error().as_deref(), Some("Invalid level 5"));
}

#[test]
fn test_unknown_associated_image() {
    let file = svs_slide().write_temp("svs");
    let slide = open(&file);

    assert_eq!(slide.associated_image_dimensions("overview"), (-1, -1));
    assert_eq!(slide.error().as_deref(), Some("Unknown associated image: overview"));
}

#[test]
fn test_negative_region_size() {
    let file = single_level().write_temp("tiff");
    let slide = open(&file);

    slide.read_region(&mut [], 0, 0, 0, -1, 5);
    assert_eq!(
        slide.error().as_deref(),
        Some("Negative width (-1) or negative height (5) not allowed")
    );
}

#[test]
fn test_short_destination_buffer() {
    let file = single_level().write_temp("tiff");
    let slide = open(&file);

    let mut dest = vec![0u32; 3];
    slide.read_region(&mut dest, 0, 0, 0, 2, 2);
    assert!(slide.error().unwrap().starts_with("Destination buffer too small"));
}

#[test]
fn test_unsupported_base_compression_fails_open() {
    let file = TiffBuilder::new()
        .add_image(ImageSpec::tiled(512, 512, 256, Codec::Other(5), vec![0u8; 64]))
        .write_temp("tiff");

    let slide = TiffEngine.open(file.path());
    assert_eq!(
        slide.error(),
        Some(format!(
            "Failed to open slide file {}: Unsupported compression: LZW",
            file.path().display()
        ))
    );
}

#[test]
fn test_unsupported_level_compression_fails_on_read() {
    let file = TiffBuilder::new()
        .add_image(ImageSpec::solid_tiled(512, 512, 256, [1, 2, 3]))
        .add_image(ImageSpec::tiled(256, 256, 256, Codec::Other(8), vec![0u8; 64]))
        .write_temp("tiff");
    let slide = open(&file);
    assert_eq!(slide.level_count(), 2);

    let mut dest = vec![5u32; 4];
    slide.read_region(&mut dest, 0, 0, 1, 2, 2);
    assert_eq!(slide.error().as_deref(), Some("Unsupported compression: Deflate"));
    assert_eq!(dest, vec![0; 4]);
}

#[test]
fn test_truncated_file_fails_open() {
    let mut data = generic_pyramid().build();
    data.truncate(data.len() - 40);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &data).unwrap();

    let slide = TiffEngine.open(file.path());
    assert!(!slide.error().unwrap().is_empty());
    assert_eq!(slide.level_count(), -1);
}

// =============================================================================
// Tile Cache
// =============================================================================

#[test]
fn test_tiles_cached_and_released() {
    let file = generic_pyramid().write_temp("tiff");
    let cache = Arc::new(TileCache::with_capacity(16 * 1024 * 1024));

    let mut slide = open(&file);
    slide.set_cache(Arc::clone(&cache));

    let mut dest = vec![0u32; 300 * 10];
    slide.read_region(&mut dest, 0, 0, 0, 300, 10);
    // Two 256x256 tiles across
    let two_tiles = 2 * 256 * 256 * 4;
    assert_eq!(cache.size(), two_tiles);

    slide.read_region(&mut dest, 0, 0, 0, 300, 10);
    assert_eq!(cache.size(), two_tiles);

    drop(slide);
    assert_eq!(cache.size(), 0);
}

#[test]
fn test_tiny_cache_still_reads() {
    let file = generic_pyramid().write_temp("tiff");
    let cache = Arc::new(TileCache::with_capacity(0));

    let mut slide = open(&file);
    slide.set_cache(Arc::clone(&cache));

    let mut dest = vec![0u32; 4];
    slide.read_region(&mut dest, 0, 0, 0, 2, 2);
    assert_eq!(dest, vec![opaque(LEVEL_COLORS[0]); 4]);
    assert_eq!(cache.size(), 0);
}
