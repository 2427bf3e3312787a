//! Error Handling Module
//!
//! Defines the error type shared by the data pipeline and the model code.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for steering_clone operations
#[derive(Error, Debug)]
pub enum DriveError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The steering log could not be read as CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A steering log row that cannot be turned into a `LogRow`
    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Image decoded fine but has the wrong dimensions
    #[error("Image '{path}' is {width}x{height}, expected {expected_width}x{expected_height}")]
    ImageShape {
        path: PathBuf,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// A batch would straddle two shuffled passes under `ExhaustionPolicy::Fail`
    #[error("Pass exhausted: {remaining} samples left, batch needs {requested}")]
    PassExhausted { remaining: usize, requested: usize },

    /// Error with model operations (building, saving, loading)
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for DriveError {
    fn from(err: serde_json::Error) -> Self {
        DriveError::Serialization(err.to_string())
    }
}

/// Convenience Result type for steering_clone operations
pub type Result<T> = std::result::Result<T, DriveError>;
