//! Error Handling Module
//!
//! Defines the error type shared by the model host, the preprocessing
//! pipeline and the HTTP layer. Uses thiserror for the definitions.
//!
//! Request-time errors carry an [`ErrorKind`] so the endpoint can report the
//! category to callers; startup errors are fatal and never reach a response.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the classifier server
#[derive(Error, Debug)]
pub enum Error {
    /// Uploaded bytes are empty or not a decodable image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Decoded image cannot be turned into a model input
    #[error("Failed to preprocess image: {0}")]
    Preprocess(String),

    /// Input tensor does not match the loaded model
    #[error("Input shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: [usize; 4],
        actual: [usize; 4],
    },

    /// Forward pass or probability readback failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Multipart body malformed or missing the file field
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upload exceeds the configured body limit
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    /// Model record could not be read
    #[error("Failed to load model at '{path}': {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// Label table and model output disagree
    #[error("Label table has {labels} entries but the model outputs {outputs} classes")]
    LabelMismatch { labels: usize, outputs: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Category of an error, reported to HTTP callers as `kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    Preprocess,
    Inference,
    BadRequest,
    Startup,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Preprocess => "preprocess",
            ErrorKind::Inference => "inference",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Startup => "startup",
        }
    }

    /// HTTP status code used when errors are reported semantically
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Decode | ErrorKind::BadRequest => 400,
            ErrorKind::Preprocess => 422,
            ErrorKind::Inference | ErrorKind::Startup => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_) => ErrorKind::Decode,
            Error::Preprocess(_) | Error::ShapeMismatch { .. } => ErrorKind::Preprocess,
            Error::Inference(_) => ErrorKind::Inference,
            Error::BadRequest(_) | Error::PayloadTooLarge(_) => ErrorKind::BadRequest,
            Error::ModelLoad { .. }
            | Error::LabelMismatch { .. }
            | Error::Config(_)
            | Error::PathNotFound(_)
            | Error::Io(_) => ErrorKind::Startup,
        }
    }

    /// HTTP status code used when errors are reported semantically
    pub fn status_code(&self) -> u16 {
        match self {
            Error::PayloadTooLarge(_) => 413,
            other => other.kind().status_code(),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Limits(e) => Error::Preprocess(e.to_string()),
            image::ImageError::Parameter(e) => Error::Preprocess(e.to_string()),
            other => Error::Decode(other.to_string()),
        }
    }
}

/// Convenience Result type for classifier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for turning foreign errors into configuration errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| Error::Config(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::Config(format!("{}: {}", f(), e)))
    }
}
