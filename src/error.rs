use thiserror::Error;

/// I/O errors that can occur when reading slide files
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Underlying file system error
    #[error("I/O error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File does not exist or cannot be accessed: {0}")]
    NotFound(String),
}

impl IoError {
    /// Build an `IoError` from a `std::io::Error` observed on `path`.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path.to_string())
        } else {
            IoError::File {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not recognized by any reader
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing or decoding TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Pixel layout the decoder cannot handle
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    /// Compressed data failed to decode
    #[error("Decode error: {0}")]
    Decode(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors surfaced by slide handles and caches.
///
/// `Open` and `Engine` carry the engine's message verbatim, so the `Display`
/// of a sticky error is exactly what [`crate::Slide::error_message`] reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlideError {
    /// The slide could not be opened (missing file, unrecognized or malformed format)
    #[error("{0}")]
    Open(String),

    /// The decoding engine latched an error after open
    #[error("{0}")]
    Engine(String),

    /// Query on a handle that owns no engine object and records no error
    #[error("Slide not initialized")]
    Uninitialized,

    /// The tile cache could not be created with the requested capacity
    #[error("Failed to create slide cache with capacity {capacity} bytes")]
    Allocation { capacity: i64 },
}

impl SlideError {
    /// The human-readable message of this error.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
