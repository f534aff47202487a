//! The slide handle and its sticky error model.
//!
//! # Error Model
//!
//! A handle is in one of three states:
//!
//! ```text
//! Uninitialized ──open──▶ Healthy ──engine error──▶ Errored
//!       └──────────────open failure───────────────────▲
//! ```
//!
//! `Errored` is absorbing. Every query checks the engine's error slot before
//! and after delegating, so an error raised by any call is observed by that
//! call and by every later one, always with the same message.

use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::engine::{unpremultiply, Engine, EngineSlide, TiffEngine, TiffSlide};
use crate::error::SlideError;

use super::cache::Cache;
use super::catalog;

// =============================================================================
// Error State
// =============================================================================

/// Sticky error state of a handle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorState {
    /// No error observed
    #[default]
    Healthy,

    /// An error was observed; never cleared
    Errored(SlideError),
}

// =============================================================================
// Open Options
// =============================================================================

/// Options for opening a [`Slide`].
///
/// # Example
///
/// ```no_run
/// use wsi_slide::{Cache, OpenOptions};
///
/// let cache = Cache::create(256 * 1024 * 1024).unwrap();
/// let slide = OpenOptions::new()
///     .cache(cache)
///     .synthesize_properties(false)
///     .open("slide.svs");
/// assert!(!slide.has_error());
/// ```
#[derive(Debug, Clone)]
pub struct OpenOptions {
    cache: Option<Arc<Cache>>,
    synthesize_properties: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            cache: None,
            synthesize_properties: true,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode tiles through a shared cache instead of a private one.
    pub fn cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Whether to build the full catalog at open (default `true`).
    ///
    /// When disabled, [`Slide::properties`] builds the raw engine view on
    /// first use instead.
    pub fn synthesize_properties(mut self, enabled: bool) -> Self {
        self.synthesize_properties = enabled;
        self
    }

    /// Open `path` with the built-in TIFF engine.
    pub fn open(&self, path: impl AsRef<Path>) -> Slide {
        self.open_with(&TiffEngine, path)
    }

    /// Open `path` with `engine`.
    ///
    /// Never fails: open errors leave the returned handle errored.
    pub fn open_with<E: Engine>(&self, engine: &E, path: impl AsRef<Path>) -> Slide<E::Slide> {
        let path = path.as_ref();
        let mut engine_slide = engine.open(path);

        let mut slide = Slide {
            path: path.to_path_buf(),
            engine: None,
            state: RefCell::new(ErrorState::Healthy),
            properties: OnceCell::new(),
            cache: self.cache.clone(),
        };

        if let Some(message) = engine_slide.error() {
            warn!(path = %path.display(), error = %message, "failed to open slide");
            slide.state = RefCell::new(ErrorState::Errored(SlideError::Open(message)));
            slide.engine = Some(engine_slide);
            return slide;
        }

        if let Some(cache) = &self.cache {
            engine_slide.set_cache(cache.tile_cache());
        }

        if self.synthesize_properties {
            let catalog = catalog::synthesize(&engine_slide, || engine.detect_vendor(path));
            match engine_slide.error() {
                Some(message) => {
                    warn!(path = %path.display(), error = %message, "failed to read slide properties");
                    slide.state = RefCell::new(ErrorState::Errored(SlideError::Open(message)));
                }
                None => {
                    debug!(path = %path.display(), properties = catalog.len(), "synthesized property catalog");
                    slide.properties = OnceCell::from(catalog);
                }
            }
        }

        slide.engine = Some(engine_slide);
        slide
    }
}

// =============================================================================
// Slide
// =============================================================================

/// An opened whole-slide image.
///
/// Queries return `Result`; once any call fails, the handle is permanently
/// errored and every later call fails with the same [`SlideError`].
///
/// A `Slide` is `Send` but not `Sync`: share one across threads behind a
/// `Mutex`, or open one handle per thread over a shared [`Cache`].
///
/// # Example
///
/// ```no_run
/// use wsi_slide::Slide;
///
/// let slide = Slide::open("slide.svs", None);
/// if let Err(e) = slide.check_error() {
///     eprintln!("cannot read slide: {}", e);
///     return;
/// }
///
/// let level = slide.best_level_for_downsample(8.0).unwrap();
/// let thumbnail = slide.read_region_image(0, 0, level, 512, 512).unwrap();
/// thumbnail.save("region.png").ok();
/// ```
pub struct Slide<S: EngineSlide = TiffSlide> {
    path: PathBuf,
    engine: Option<S>,
    state: RefCell<ErrorState>,
    properties: OnceCell<BTreeMap<String, String>>,
    cache: Option<Arc<Cache>>,
}

impl Slide<TiffSlide> {
    /// Open `path` with the built-in engine, optionally through a shared cache.
    pub fn open(path: impl AsRef<Path>, cache: Option<Arc<Cache>>) -> Self {
        let mut options = OpenOptions::new();
        options.cache = cache;
        options.open(path)
    }

    /// Vendor of the slide at `path`, without opening it.
    pub fn detect_vendor(path: impl AsRef<Path>) -> Option<String> {
        TiffEngine.detect_vendor(path.as_ref())
    }

    /// Version of the built-in engine.
    pub fn version() -> &'static str {
        TiffEngine.version()
    }
}

impl<S: EngineSlide> Slide<S> {
    /// Open `path` with `engine`, optionally through a shared cache.
    pub fn open_with<E: Engine<Slide = S>>(engine: &E, path: impl AsRef<Path>, cache: Option<Arc<Cache>>) -> Self {
        let mut options = OpenOptions::new();
        options.cache = cache;
        options.open_with(engine, path)
    }

    /// Path the slide was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shared cache this slide was opened with.
    pub fn cache(&self) -> Option<&Arc<Cache>> {
        self.cache.as_ref()
    }

    /// Release the engine object now rather than at drop.
    pub fn close(self) {}

    // -------------------------------------------------------------------------
    // Error model
    // -------------------------------------------------------------------------

    /// Fold the engine's live error into the sticky state.
    ///
    /// # Errors
    /// The sticky error, or `SlideError::Uninitialized` for a handle that
    /// owns no engine object (not latched).
    pub fn check_error(&self) -> Result<(), SlideError> {
        let latched = self.refresh();

        match &*self.state.borrow() {
            ErrorState::Errored(err) => {
                if latched {
                    warn!(path = %self.path.display(), error = %err, "slide error latched");
                }
                Err(err.clone())
            }
            ErrorState::Healthy if self.engine.is_none() => Err(SlideError::Uninitialized),
            ErrorState::Healthy => Ok(()),
        }
    }

    /// Latch the engine's live error, if any, into a healthy handle.
    ///
    /// Returns whether this call latched it.
    fn refresh(&self) -> bool {
        if matches!(*self.state.borrow(), ErrorState::Errored(_)) {
            return false;
        }
        let Some(message) = self.engine.as_ref().and_then(|engine| engine.error()) else {
            return false;
        };
        *self.state.borrow_mut() = ErrorState::Errored(SlideError::Engine(message));
        true
    }

    /// Whether the handle is errored.
    pub fn has_error(&self) -> bool {
        self.refresh();
        matches!(*self.state.borrow(), ErrorState::Errored(_))
    }

    /// The sticky error message, empty when healthy.
    pub fn error_message(&self) -> String {
        self.refresh();
        match &*self.state.borrow() {
            ErrorState::Errored(err) => err.message(),
            ErrorState::Healthy => String::new(),
        }
    }

    /// Snapshot of the error state.
    pub fn error_state(&self) -> ErrorState {
        self.refresh();
        self.state.borrow().clone()
    }

    /// Run `op` against the engine between two error checks.
    fn guarded<T>(&self, op: impl FnOnce(&S) -> T) -> Result<T, SlideError> {
        self.check_error()?;
        let engine = self.engine.as_ref().ok_or(SlideError::Uninitialized)?;
        let value = op(engine);
        self.check_error()?;
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    /// Number of pyramid levels.
    pub fn level_count(&self) -> Result<i32, SlideError> {
        self.guarded(|engine| engine.level_count())
    }

    /// `(width, height)` of `level`.
    pub fn level_dimensions(&self, level: i32) -> Result<(i64, i64), SlideError> {
        self.guarded(|engine| engine.level_dimensions(level))
    }

    /// `(width, height)` of level 0.
    pub fn level0_dimensions(&self) -> Result<(i64, i64), SlideError> {
        self.guarded(|engine| engine.level0_dimensions())
    }

    /// Downsample of `level` relative to level 0.
    pub fn level_downsample(&self, level: i32) -> Result<f64, SlideError> {
        self.guarded(|engine| engine.level_downsample(level))
    }

    /// Level to read from when rendering at `downsample`.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Result<i32, SlideError> {
        self.guarded(|engine| engine.best_level_for_downsample(downsample))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read a `w x h` region of `level` into `dest` as premultiplied ARGB.
    ///
    /// `(x, y)` is the top-left corner in level-0 coordinates. Pixels outside
    /// the image are transparent.
    pub fn read_region(
        &self,
        dest: &mut [u32],
        x: i64,
        y: i64,
        level: i32,
        w: i64,
        h: i64,
    ) -> Result<(), SlideError> {
        self.guarded(|engine| engine.read_region(dest, x, y, level, w, h))
    }

    /// Read a region into a new straight-alpha RGBA image.
    pub fn read_region_image(
        &self,
        x: i64,
        y: i64,
        level: i32,
        w: i64,
        h: i64,
    ) -> Result<RgbaImage, SlideError> {
        let Some((width, height, mut buffer)) = pixel_buffer(w, h) else {
            // Sizes that cannot be allocated are the engine's to reject
            self.read_region(&mut [], x, y, level, w, h)?;
            return Ok(RgbaImage::new(0, 0));
        };

        self.read_region(&mut buffer, x, y, level, w, h)?;
        Ok(argb_to_image(&buffer, width, height))
    }

    /// Names of the associated images.
    pub fn associated_image_names(&self) -> Result<Vec<String>, SlideError> {
        self.guarded(|engine| engine.associated_image_names())
    }

    /// `(width, height)` of an associated image.
    pub fn associated_image_dimensions(&self, name: &str) -> Result<(i64, i64), SlideError> {
        self.guarded(|engine| engine.associated_image_dimensions(name))
    }

    /// Read a whole associated image into `dest` as premultiplied ARGB.
    pub fn read_associated_image(&self, name: &str, dest: &mut [u32]) -> Result<(), SlideError> {
        self.guarded(|engine| engine.read_associated_image(name, dest))
    }

    /// Read a whole associated image into a new straight-alpha RGBA image.
    pub fn read_associated_image_rgba(&self, name: &str) -> Result<RgbaImage, SlideError> {
        let (w, h) = self.associated_image_dimensions(name)?;
        let Some((width, height, mut buffer)) = pixel_buffer(w, h) else {
            self.read_associated_image(name, &mut [])?;
            return Ok(RgbaImage::new(0, 0));
        };

        self.read_associated_image(name, &mut buffer)?;
        Ok(argb_to_image(&buffer, width, height))
    }

    /// Size in bytes of the slide's ICC profile, 0 when absent.
    pub fn icc_profile_size(&self) -> Result<i64, SlideError> {
        self.guarded(|engine| engine.icc_profile_size())
    }

    /// Copy the slide's ICC profile into `dest`.
    pub fn read_icc_profile(&self, dest: &mut [u8]) -> Result<(), SlideError> {
        self.guarded(|engine| engine.read_icc_profile(dest))
    }

    /// Size in bytes of an associated image's ICC profile, 0 when absent.
    pub fn associated_image_icc_profile_size(&self, name: &str) -> Result<i64, SlideError> {
        self.guarded(|engine| engine.associated_image_icc_profile_size(name))
    }

    /// Copy an associated image's ICC profile into `dest`.
    pub fn read_associated_image_icc_profile(
        &self,
        name: &str,
        dest: &mut [u8],
    ) -> Result<(), SlideError> {
        self.guarded(|engine| engine.read_associated_image_icc_profile(name, dest))
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Names of the engine's raw properties.
    pub fn property_names(&self) -> Result<Vec<String>, SlideError> {
        self.guarded(|engine| engine.property_names())
    }

    /// Value of one raw engine property.
    pub fn property_value(&self, name: &str) -> Result<Option<String>, SlideError> {
        self.guarded(|engine| engine.property_value(name))
    }

    /// The property catalog.
    ///
    /// This is the full catalog synthesized at open, or, when synthesis was
    /// disabled, the raw engine view built and cached on first call.
    pub fn properties(&self) -> Result<&BTreeMap<String, String>, SlideError> {
        self.check_error()?;
        if let Some(catalog) = self.properties.get() {
            return Ok(catalog);
        }

        let view = self.guarded(|engine| catalog::raw_view(engine))?;
        Ok(self.properties.get_or_init(|| view))
    }
}

impl<S: EngineSlide> Default for Slide<S> {
    /// An uninitialized handle: no engine object and no error.
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            engine: None,
            state: RefCell::new(ErrorState::Healthy),
            properties: OnceCell::new(),
            cache: None,
        }
    }
}

impl<S: EngineSlide> Drop for Slide<S> {
    fn drop(&mut self) {
        if self.engine.take().is_some() {
            debug!(path = %self.path.display(), "closed slide");
        }
    }
}

impl<S: EngineSlide> std::fmt::Debug for Slide<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slide")
            .field("path", &self.path)
            .field("open", &self.engine.is_some())
            .field("state", &*self.state.borrow())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Zeroed buffer for a `w x h` image, None when the size is negative or
/// cannot be allocated.
fn pixel_buffer(w: i64, h: i64) -> Option<(u32, u32, Vec<u32>)> {
    let width = u32::try_from(w).ok()?;
    let height = u32::try_from(h).ok()?;
    let len = (width as usize).checked_mul(height as usize)?;

    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).ok()?;
    buffer.resize(len, 0u32);
    Some((width, height, buffer))
}

/// Convert premultiplied ARGB pixels into a straight-alpha RGBA image.
fn argb_to_image(pixels: &[u32], width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba(unpremultiply(pixels[y as usize * width as usize + x as usize]))
    })
}

// =============================================================================
// Tests
// =============================================================================
