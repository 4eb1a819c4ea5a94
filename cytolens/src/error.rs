use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by configuration, training and classification.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Library model not found at '{path}': {reason}")]
    LibraryNotFound { path: PathBuf, reason: String },

    #[error("Library holds no usable patches")]
    EmptyLibrary,

    #[error("Query dimension {actual} does not match model dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Zero distance to training sample {index}")]
    DegenerateDistance { index: usize },

    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),

    #[error("Failed to persist '{path}': {reason}")]
    Persist { path: PathBuf, reason: String },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Cancelled(#[from] common::Cancelled),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur when decoding or encoding an image file.
#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("Failed to decode image '{path}': {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to write image '{path}': {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Unsupported pixel layout in '{path}': {reason}")]
    UnsupportedLayout { path: PathBuf, reason: String },
}
