//! TIFF tag and field type definitions.
//!
//! The vocabulary the parser and the engine share: field types that decide how
//! values are encoded, tag IDs for pyramid structure and the baseline metadata
//! surfaced as `tiff.*` properties, and compression identifiers.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
///
/// Each field type has a fixed element size, which decides whether a value is
/// stored inline in its IFD entry and how arrays are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer (1 byte)
    Byte = 1,

    /// 8-bit ASCII character (1 byte)
    Ascii = 2,

    /// Unsigned 16-bit integer (2 bytes)
    Short = 3,

    /// Unsigned 32-bit integer (4 bytes)
    Long = 4,

    /// Two Longs: numerator then denominator (8 bytes)
    Rational = 5,

    /// Undefined byte data (1 byte per element)
    Undefined = 7,

    /// Unsigned 64-bit integer (8 bytes) - BigTIFF only
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational | FieldType::Long8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for types the parser does not read (SRATIONAL, FLOAT, ...).
    /// Entries of those types are kept but their values are never decoded.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            7 => Some(FieldType::Undefined),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Maximum bytes stored inline in a classic TIFF IFD entry.
    pub const INLINE_THRESHOLD_TIFF: usize = 4;

    /// Maximum bytes stored inline in a BigTIFF IFD entry.
    pub const INLINE_THRESHOLD_BIGTIFF: usize = 8;

    /// Check if a value with this type and count fits inline in an entry.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let total_size = (self.size_in_bytes() as u64).saturating_mul(count);
        let threshold = if is_bigtiff {
            Self::INLINE_THRESHOLD_BIGTIFF as u64
        } else {
            Self::INLINE_THRESHOLD_TIFF as u64
        };
        total_size <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs the engine reads.
///
/// Tags not listed here are still parsed into the IFD (by numeric ID) but are
/// otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Basic Image Structure
    // -------------------------------------------------------------------------
    /// Subfile type bitmask (reduced resolution, page, mask)
    NewSubfileType = 254,

    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample (typically 8)
    BitsPerSample = 258,

    /// Compression scheme used
    Compression = 259,

    /// Photometric interpretation (RGB, YCbCr, etc.)
    PhotometricInterpretation = 262,

    /// Number of components per pixel (e.g., 3 for RGB)
    SamplesPerPixel = 277,

    /// How components are organized (chunky vs planar)
    PlanarConfiguration = 284,

    // -------------------------------------------------------------------------
    // Baseline descriptive strings
    // -------------------------------------------------------------------------
    /// Name of the scanned document
    DocumentName = 269,

    /// Description string (carries vendor metadata in SVS files)
    ImageDescription = 270,

    /// Scanner manufacturer
    Make = 271,

    /// Scanner model
    Model = 272,

    /// Software that wrote the file
    Software = 305,

    /// Creation timestamp, "YYYY:MM:DD HH:MM:SS"
    DateTime = 306,

    /// Person who created the image
    Artist = 315,

    /// Computer the image was created on
    HostComputer = 316,

    /// Copyright notice
    Copyright = 33432,

    // -------------------------------------------------------------------------
    // Strip Organization (used to detect unsupported files)
    // -------------------------------------------------------------------------
    /// Byte offsets of strips
    StripOffsets = 273,

    /// Row count per strip
    RowsPerStrip = 278,

    /// Byte counts of strips
    StripByteCounts = 279,

    // -------------------------------------------------------------------------
    // Tile Organization
    // -------------------------------------------------------------------------
    /// Width of each tile in pixels
    TileWidth = 322,

    /// Height (length) of each tile in pixels
    TileLength = 323,

    /// Byte offsets of each tile in the file
    TileOffsets = 324,

    /// Byte counts of each tile
    TileByteCounts = 325,

    // -------------------------------------------------------------------------
    // JPEG Handling
    // -------------------------------------------------------------------------
    /// JPEG quantization and Huffman tables shared by abbreviated tile streams
    JpegTables = 347,

    /// YCbCr subsampling factors
    YCbCrSubSampling = 530,

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------
    /// Pixels per unit in X direction
    XResolution = 282,

    /// Pixels per unit in Y direction
    YResolution = 283,

    /// Unit of resolution (1=none, 2=inch, 3=centimeter)
    ResolutionUnit = 296,

    // -------------------------------------------------------------------------
    // Color
    // -------------------------------------------------------------------------
    /// Embedded ICC color profile
    IccProfile = 34675,
}

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    ///
    /// Returns `None` for unrecognized tags.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            254 => Some(TiffTag::NewSubfileType),
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            269 => Some(TiffTag::DocumentName),
            270 => Some(TiffTag::ImageDescription),
            271 => Some(TiffTag::Make),
            272 => Some(TiffTag::Model),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            282 => Some(TiffTag::XResolution),
            283 => Some(TiffTag::YResolution),
            284 => Some(TiffTag::PlanarConfiguration),
            296 => Some(TiffTag::ResolutionUnit),
            305 => Some(TiffTag::Software),
            306 => Some(TiffTag::DateTime),
            315 => Some(TiffTag::Artist),
            316 => Some(TiffTag::HostComputer),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            347 => Some(TiffTag::JpegTables),
            530 => Some(TiffTag::YCbCrSubSampling),
            33432 => Some(TiffTag::Copyright),
            34675 => Some(TiffTag::IccProfile),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Canonical tag name, as used in the TIFF 6.0 specification.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::NewSubfileType => "NewSubfileType",
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::DocumentName => "DocumentName",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::Make => "Make",
            TiffTag::Model => "Model",
            TiffTag::Software => "Software",
            TiffTag::DateTime => "DateTime",
            TiffTag::Artist => "Artist",
            TiffTag::HostComputer => "HostComputer",
            TiffTag::Copyright => "Copyright",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::JpegTables => "JPEGTables",
            TiffTag::YCbCrSubSampling => "YCbCrSubSampling",
            TiffTag::XResolution => "XResolution",
            TiffTag::YResolution => "YResolution",
            TiffTag::ResolutionUnit => "ResolutionUnit",
            TiffTag::IccProfile => "ICCProfile",
        }
    }

    /// Property name used for this tag under the `tiff.` namespace.
    ///
    /// Only the baseline descriptive and resolution tags have one.
    pub const fn property_name(self) -> Option<&'static str> {
        match self {
            TiffTag::DocumentName
            | TiffTag::ImageDescription
            | TiffTag::Make
            | TiffTag::Model
            | TiffTag::Software
            | TiffTag::DateTime
            | TiffTag::Artist
            | TiffTag::HostComputer
            | TiffTag::Copyright
            | TiffTag::XResolution
            | TiffTag::YResolution
            | TiffTag::ResolutionUnit => Some(self.name()),
            _ => None,
        }
    }
}

/// Baseline ASCII tags copied into `tiff.*` properties.
pub const STRING_PROPERTY_TAGS: [TiffTag; 9] = [
    TiffTag::DocumentName,
    TiffTag::ImageDescription,
    TiffTag::Make,
    TiffTag::Model,
    TiffTag::Software,
    TiffTag::DateTime,
    TiffTag::Artist,
    TiffTag::HostComputer,
    TiffTag::Copyright,
];

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression scheme identifiers.
///
/// Tiles are decodable when uncompressed or baseline JPEG. Everything else is
/// recognized by name only so errors can say what was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// No compression
    None = 1,

    /// LZW compression
    Lzw = 5,

    /// "Old-style" JPEG
    OldJpeg = 6,

    /// JPEG compression
    Jpeg = 7,

    /// Deflate/zlib compression
    Deflate = 8,

    /// Adobe Deflate
    AdobeDeflate = 32946,

    /// JPEG 2000 (Aperio YCbCr)
    Jpeg2000 = 33003,
}

impl Compression {
    /// Create a Compression from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32946 => Some(Compression::AdobeDeflate),
            33003 => Some(Compression::Jpeg2000),
            _ => None,
        }
    }

    /// Check if tiles with this compression can be decoded.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(self, Compression::None | Compression::Jpeg)
    }

    /// Get a human-readable name for the compression scheme.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
