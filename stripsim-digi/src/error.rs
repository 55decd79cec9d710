//! Digitization error types.

use thiserror::Error;

/// Result type for digitization.
pub type Result<T> = std::result::Result<T, Error>;

/// Digitization error types.
///
/// All variants are fatal for the run. Skipped segments, discarded charges
/// and merged signals are reported through statistics instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid digitization configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A random distribution could not be built from the parameters.
    #[error("invalid distribution parameter for {name}: {reason}")]
    Distribution {
        /// Distribution name.
        name: &'static str,
        /// Error reported by the distribution.
        reason: String,
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
