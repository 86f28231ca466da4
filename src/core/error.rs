//! Error types for the compositing engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed write request, rejected before any cell is touched.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Layer is locked: {0}")]
    LayerLocked(String),

    #[error("Duplicate layer name: {0}")]
    DuplicateLayer(String),

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// A stencil value that does not decode to a valid (owner, strength) pair.
    #[error("Corrupt stencil value: {raw}")]
    CorruptStencil { raw: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}
