//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A data file could not be opened or mapped.
    #[error("cannot open data file {}: {source}", path.display())]
    Open {
        /// File path.
        path: std::path::PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The data does not start with the expected magic bytes.
    #[error("bad magic {0:?}, not an STSD data file")]
    BadMagic([u8; 4]),

    /// The file was written by an unknown schema version.
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u16),

    /// Unknown record kind tag.
    #[error("unknown record kind {0}")]
    UnknownKind(u8),

    /// The file holds records of another kind than requested.
    #[error("file holds {found} records, expected {expected}")]
    KindMismatch {
        /// Requested kind.
        expected: &'static str,
        /// Kind stored in the header.
        found: &'static str,
    },

    /// The data ends inside a record.
    #[error("truncated data: need {needed} bytes at offset {offset}, have {len}")]
    Truncated {
        /// Read position.
        offset: usize,
        /// Bytes required.
        needed: usize,
        /// Total length.
        len: usize,
    },

    /// Invalid field value.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] stripsim_core::Error),
}
