//! Error types for screenshot annotation
use std::fmt;

#[derive(Debug)]
pub enum VisualError {
    /// Raw screenshot bytes could not be decoded
    Decode(String),

    /// Annotated image could not be re-encoded
    Encode(String),

    /// Invalid input parameters
    InvalidInput(String),
}

impl fmt::Display for VisualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "Screenshot decode failed: {}", msg),
            Self::Encode(msg) => write!(f, "Screenshot encode failed: {}", msg),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for VisualError {}

impl From<image::ImageError> for VisualError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(_) => Self::Encode(err.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}
