//! stripsim-io: persistence of strip detector data.
//!
//! Digis, clusters and hits are written in a small versioned binary schema
//! (see [`codec`]) or as CSV tables, and read back through memory-mapped
//! files via memmap2.
//!

pub mod codec;
mod error;
mod reader;
mod writer;

pub use codec::{decode_records, encode_records, FileHeader, Record, RecordKind};
pub use error::{Error, Result};
pub use reader::DataFileReader;
pub use writer::DataFileWriter;
