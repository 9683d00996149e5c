//! Common error types for kelpline

use thiserror::Error;

/// Common result type for kelpline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the kelpline crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error (wraps csv::Error)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON layer parse error (wraps serde_json::Error)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value outside its domain (year, presence, abundance class)
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Malformed or inconsistent input layer
    #[error("Layer error: {0}")]
    Layer(String),
}
