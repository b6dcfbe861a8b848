//! Error types for the quote-graph system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the quote-graph system.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Delivered batch is shorter than the committed history.
    #[error("Batch regressed: {received} records delivered, {committed} already committed")]
    BatchRegressed { committed: usize, received: usize },

    /// Delivered batch does not start with the committed history.
    #[error("Prefix mismatch: batch disagrees with the {committed} committed records")]
    PrefixMismatch { committed: usize },

    /// Aggregation engine or rendering surface error.
    #[error("Engine error: {0}")]
    Engine(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Error::Engine(msg.into())
    }

    /// Whether the error is a rejected delivery (caller broke the cumulative-batch contract).
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::BatchRegressed { .. } | Error::PrefixMismatch { .. })
    }
}
