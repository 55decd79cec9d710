//! Reconstruction error types.

use thiserror::Error;

/// Result type for reconstruction.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconstruction error types.
///
/// Ignored digis and cluster pairs without intersection are not errors;
/// they show up in [`crate::ReconstructionStatistics`].
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid reconstruction configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A cluster refers to a digi that is not in the input.
    #[error("cluster member {index} not in digi input of length {len}")]
    MissingDigi {
        /// Member index.
        index: usize,
        /// Length of the digi input.
        len: usize,
    },

    /// JSON configuration error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] stripsim_core::Error),
}
