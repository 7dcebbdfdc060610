//! Compositor error types.

use std::fmt;

/// Errors that can occur while producing a watermarked JPEG.
#[derive(Debug)]
pub enum CompositeError {
    /// Failed to decode the base image
    Decode(String),

    /// Failed to decode the watermark image
    WatermarkDecode(String),

    /// Failed to encode the output image
    Encode(String),
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "Failed to decode base image: {}", msg),
            Self::WatermarkDecode(msg) => write!(f, "Failed to decode watermark image: {}", msg),
            Self::Encode(msg) => write!(f, "Failed to encode output image: {}", msg),
        }
    }
}

impl std::error::Error for CompositeError {}
