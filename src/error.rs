use thiserror::Error;

/// Errors surfaced by the transform pipeline.
///
/// Metadata problems never show up here: the EXIF adapter swallows them and
/// the pipeline carries on with the original metadata segment.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Not a JPEG file: {0}")]
    NotAJpeg(&'static str),
    #[error("Unsupported JPEG format: {0}")]
    UnsupportedFormat(&'static str),
    #[error("Corrupt JPEG data: {0}")]
    CorruptData(&'static str),
    #[error("Chroma subsampling does not allow this transform: {0}")]
    UnsupportedGeometry(&'static str),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not enough memory")]
    OutOfMemory,
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    // Logic errors
    #[error("Invalid operation for pipeline state {0}")]
    InvalidState(&'static str),
}

impl From<std::collections::TryReserveError> for TransformError {
    fn from(_: std::collections::TryReserveError) -> Self {
        TransformError::OutOfMemory
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;

/// Errors raised while reading or rewriting an EXIF block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExifError {
    #[error("Missing Exif identifier")]
    MissingIdentifier,
    #[error("Invalid TIFF header")]
    InvalidTiffHeader,
    #[error("Offset {0} out of bounds")]
    OutOfBounds(usize),
    #[error("IFD chain loops back on itself")]
    IfdLoop,
    #[error("Tag {tag:#06x} has non-integer format {format}")]
    NotAnInteger { tag: u16, format: u16 },
    #[error("Value {value} does not fit tag {tag:#06x}")]
    ValueOutOfRange { tag: u16, value: u32 },
    #[error("Exif block exceeds one APP1 segment ({0} bytes)")]
    TooLarge(usize),
    #[error("Thumbnail could not be transformed: {0}")]
    Thumbnail(String),
}
