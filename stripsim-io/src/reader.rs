//! Reading STSD data files.
//!
//! A data file is mapped into memory once; the header is checked on open
//! and records are decoded straight from the mapping.

use crate::codec::{decode_records, FileHeader, Record, HEADER_SIZE};
use crate::{Error, Result};
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Memory-mapped STSD file with a validated header.
pub struct DataFileReader {
    map: Mmap,
    path: PathBuf,
    header: FileHeader,
}

impl DataFileReader {
    /// Maps a data file and checks its header.
    ///
    /// # Errors
    /// Returns [`Error::Open`] if the file cannot be opened or mapped, and a
    /// header error (magic, version, kind, truncation) otherwise.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| Error::Open {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(open_error)?;
        // SAFETY: data files are written once and only read afterwards;
        // nothing truncates them while mapped.
        #[allow(unsafe_code)]
        let map = unsafe { Mmap::map(&file) }.map_err(open_error)?;
        let header = FileHeader::parse(&map)?;
        debug!(
            "{}: {} {} records, schema v{}",
            path.display(),
            header.count,
            header.kind.name(),
            header.version
        );
        Ok(Self { map, path, header })
    }

    /// File header.
    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoded record block following the header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.map[HEADER_SIZE..]
    }

    /// Size of the record block in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload().len()
    }

    /// Decodes all records.
    ///
    /// # Errors
    /// Returns [`Error::KindMismatch`] if the file holds another record
    /// kind, or a decoding error for corrupt records.
    pub fn read<R: Record>(&self) -> Result<Vec<R>> {
        decode_records(&self.map).map_err(|e| {
            debug!("failed to decode {}: {e}", self.path.display());
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordKind;
    use crate::DataFileWriter;
    use std::io::Write;
    use stripsim_core::{Cluster, Digi, Side, StsAddress};
    use tempfile::NamedTempFile;

    #[test]
    fn test_foreign_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..64).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            DataFileReader::open(file.path()),
            Err(Error::BadMagic([0, 1, 2, 3]))
        ));
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        match DataFileReader::open(&path) {
            Err(Error::Open { path: p, .. }) => assert_eq!(p, path),
            _ => panic!("expected an open error"),
        }
    }

    #[test]
    fn test_data_file_reader_clusters() {
        let file = NamedTempFile::new().unwrap();
        let module = StsAddress::module(0, 0, 0, 1).unwrap();
        let clusters: Vec<Cluster> = [0.0, 10.0, 20.0]
            .into_iter()
            .enumerate()
            .map(|(i, position)| {
                let mut c = Cluster::new(module, Side::Front);
                c.push(i);
                c.set_properties(1.0e4, position, 0.2, 5.0, 5.0);
                c
            })
            .collect();
        DataFileWriter::create(file.path())
            .unwrap()
            .write_records(&clusters)
            .unwrap();

        let reader = DataFileReader::open(file.path()).unwrap();
        assert_eq!(reader.header().kind, RecordKind::Cluster);
        assert_eq!(reader.header().count, 3);
        assert_eq!(reader.read::<Cluster>().unwrap(), clusters);
        assert!(matches!(
            reader.read::<Digi>(),
            Err(Error::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            DataFileReader::open(file.path()),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_empty_record_list() {
        let file = NamedTempFile::new().unwrap();
        DataFileWriter::create(file.path())
            .unwrap()
            .write_records::<Digi>(&[])
            .unwrap();
        let reader = DataFileReader::open(file.path()).unwrap();
        assert_eq!(reader.path(), file.path());
        assert_eq!(reader.payload_size(), 0);
        assert!(reader.read::<Digi>().unwrap().is_empty());
    }
}
