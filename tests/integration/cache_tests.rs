//! Shared cache tests.

use std::sync::{Arc, Mutex};
use std::thread;

use wsi_slide::{Cache, OpenOptions, Slide, SlideError};

use super::test_utils::{generic_pyramid, svs_slide, LEVEL_COLORS};

#[test]
fn test_create_cache() {
    let cache = Cache::create(1024 * 1024).unwrap();
    assert_eq!(cache.size(), 1024 * 1024);
    assert_eq!(cache.cached_bytes(), 0);

    assert_eq!(
        Cache::create(-1).unwrap_err(),
        SlideError::Allocation { capacity: -1 }
    );
}

#[test]
fn test_slides_share_one_cache() {
    let tiff = generic_pyramid().write_temp("tiff");
    let svs = svs_slide().write_temp("svs");
    let cache = Cache::create(64 * 1024 * 1024).unwrap();

    let a = Slide::open(tiff.path(), Some(Arc::clone(&cache)));
    let b = Slide::open(svs.path(), Some(Arc::clone(&cache)));
    assert_eq!(Arc::strong_count(&cache), 3);
    assert!(Arc::ptr_eq(a.cache().unwrap(), b.cache().unwrap()));

    a.read_region_image(0, 0, 0, 16, 16).unwrap();
    let after_a = cache.cached_bytes();
    assert!(after_a > 0);

    b.read_region_image(0, 0, 0, 16, 16).unwrap();
    assert!(cache.cached_bytes() > after_a);

    // Closing a slide evicts its tiles only
    a.close();
    let after_close = cache.cached_bytes();
    assert!(after_close > 0);
    assert!(after_close < cache.size() as usize);

    drop(b);
    assert_eq!(cache.cached_bytes(), 0);
    assert_eq!(Arc::strong_count(&cache), 1);
}

#[test]
fn test_cache_outlives_slides() {
    let tiff = generic_pyramid().write_temp("tiff");
    let slide = {
        let cache = Cache::create(8 * 1024 * 1024).unwrap();
        OpenOptions::new().cache(cache).open(tiff.path())
    };

    let image = slide.read_region_image(0, 0, 0, 2, 2).unwrap();
    let [r, g, b] = LEVEL_COLORS[0];
    assert_eq!(image.get_pixel(1, 1).0, [r, g, b, 255]);
    assert!(slide.cache().unwrap().cached_bytes() > 0);
}

#[test]
fn test_cache_capacity_bounds_tiles() {
    let tiff = generic_pyramid().write_temp("tiff");
    // Room for a single 256x256 tile
    let cache = Cache::create(256 * 256 * 4).unwrap();
    let slide = Slide::open(tiff.path(), Some(Arc::clone(&cache)));

    let image = slide.read_region_image(0, 0, 0, 1024, 768).unwrap();
    assert_eq!(image.dimensions(), (1024, 768));
    assert!(cache.cached_bytes() <= 256 * 256 * 4);
    assert!(!slide.has_error());
}

#[test]
fn test_zero_capacity_cache() {
    let tiff = generic_pyramid().write_temp("tiff");
    let cache = Cache::create(0).unwrap();
    let slide = Slide::open(tiff.path(), Some(Arc::clone(&cache)));

    slide.read_region_image(0, 0, 0, 300, 300).unwrap();
    assert_eq!(cache.cached_bytes(), 0);
}

#[test]
fn test_handles_on_threads_share_cache() {
    let tiff = generic_pyramid().write_temp("tiff");
    let path = tiff.path().to_path_buf();
    let cache = Cache::create(32 * 1024 * 1024).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let path = path.clone();
            thread::spawn(move || {
                let slide = Slide::open(&path, Some(cache));
                let level = i % 3;
                let image = slide.read_region_image(0, 0, level, 32, 32).unwrap();
                image.get_pixel(0, 0).0
            })
        })
        .collect();

    for (i, worker) in workers.into_iter().enumerate() {
        let [r, g, b] = LEVEL_COLORS[i % 3];
        assert_eq!(worker.join().unwrap(), [r, g, b, 255]);
    }
}

#[test]
fn test_slide_behind_mutex() {
    let tiff = generic_pyramid().write_temp("tiff");
    let slide = Arc::new(Mutex::new(Slide::open(tiff.path(), None)));

    let workers: Vec<_> = (0..3)
        .map(|level| {
            let slide = Arc::clone(&slide);
            thread::spawn(move || {
                let slide = slide.lock().unwrap();
                slide.level_dimensions(level).unwrap()
            })
        })
        .collect();

    let mut sizes: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![(256, 192), (512, 384), (1024, 768)]);
}
