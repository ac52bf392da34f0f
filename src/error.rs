//! Error types for the pixread library.

use thiserror::Error;

use crate::decode::inflate::InflateError;

/// Result type alias for pixread operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Image header declares a zero width or height.
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },
    /// Image dimensions exceed the configured maximum.
    #[error("Image {width}x{height} exceeds maximum dimension {max}")]
    ImageTooLarge {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Maximum supported dimension.
        max: u32,
    },
    /// The input does not start with a PNG, JPEG or PPM signature.
    #[error("Unrecognized image format")]
    UnknownFormat,
    /// The input is malformed.
    #[error("Invalid image data: {0}")]
    InvalidDecode(String),
    /// The input is well-formed but uses a feature this crate does not decode.
    #[error("Unsupported image feature: {0}")]
    UnsupportedDecode(String),
    /// The zlib stream inside a PNG failed to inflate.
    #[error(transparent)]
    Inflate(#[from] InflateError),
}
