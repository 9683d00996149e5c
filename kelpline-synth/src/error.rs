//! Error types for kelpline-synth
//!
//! Per-job failures (geometry, schema) are isolated: they fail one
//! (source, year) job and are collected into the run report while the rest
//! of the run proceeds. Only missing top-level inputs are fatal.

use thiserror::Error;

/// Result type for synthesis operations
pub type SynthResult<T> = std::result::Result<T, SynthError>;

/// Synthesis pipeline error type
#[derive(Debug, Error)]
pub enum SynthError {
    /// Geometry engine failure, isolated to one (source, year) job
    #[error("geometry failure in {job}: {message}")]
    Geometry { job: String, message: String },

    /// Source data that does not match its declared schema
    #[error("schema failure in {job}: {message}")]
    Schema { job: String, message: String },

    /// Run manifest loading or validation error
    #[error("config error: {0}")]
    Config(String),

    /// Shared record/layer error
    #[error(transparent)]
    Common(#[from] kelpline_common::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (run report, joined outputs)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
