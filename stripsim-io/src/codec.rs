//! Versioned binary schema for digis, clusters and hits.
//!
//! A data file is a 16-byte header followed by records of one kind:
//!
//! | offset | size | field                        |
//! |--------|------|------------------------------|
//! | 0      | 4    | magic `STSD`                 |
//! | 4      | 2    | schema version (`u16`)       |
//! | 6      | 1    | record kind (`u8`)           |
//! | 7      | 1    | reserved, zero               |
//! | 8      | 8    | record count (`u64`)         |
//!
//! All integers and floats are little-endian. Provenance is stored as a
//! `u32` link count followed by `(file: i32, entry: i32, index: i32,
//! weight: f64)` per link. Cluster member lists are a `u32` count followed
//! by `u64` digi indices. Absent hit cluster references are `u64::MAX`.

use crate::error::{Error, Result};
use stripsim_core::{Cluster, Covariance2, Digi, Hit, Match, Origin, Side, StsAddress};

/// File magic.
pub const MAGIC: [u8; 4] = *b"STSD";

/// Current schema version.
pub const SCHEMA_VERSION: u16 = 1;

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

const NO_CLUSTER: u64 = u64::MAX;

/// Entity stored in a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// [`Digi`] records.
    Digi = 1,
    /// [`Cluster`] records.
    Cluster = 2,
    /// [`Hit`] records.
    Hit = 3,
}

impl RecordKind {
    /// Decodes a kind tag.
    ///
    /// # Errors
    /// Returns [`Error::UnknownKind`] for an unassigned tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Digi),
            2 => Ok(Self::Cluster),
            3 => Ok(Self::Hit),
            other => Err(Error::UnknownKind(other)),
        }
    }

    /// Lower-case entity name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Digi => "digi",
            Self::Cluster => "cluster",
            Self::Hit => "hit",
        }
    }
}

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Schema version.
    pub version: u16,
    /// Record kind.
    pub kind: RecordKind,
    /// Number of records following the header.
    pub count: u64,
}

impl FileHeader {
    /// Header of the current schema version.
    #[must_use]
    pub fn new(kind: RecordKind, count: u64) -> Self {
        Self {
            version: SCHEMA_VERSION,
            kind,
            count,
        }
    }

    /// Encodes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6] = self.kind as u8;
        bytes[8..16].copy_from_slice(&self.count.to_le_bytes());
        bytes
    }

    /// Decodes and checks the header at the start of `data`.
    ///
    /// # Errors
    /// Returns an error for short data, a wrong magic, an unsupported
    /// version or an unknown record kind.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let magic = decoder.array::<4>()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = decoder.u16()?;
        if version != SCHEMA_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let kind = RecordKind::from_tag(decoder.u8()?)?;
        decoder.u8()?;
        let count = decoder.u64()?;
        Ok(Self {
            version,
            kind,
            count,
        })
    }
}

/// An entity with a fixed binary layout.
pub trait Record: Sized {
    /// Kind tag written to the header.
    const KIND: RecordKind;

    /// Appends the encoded record to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decodes one record.
    ///
    /// # Errors
    /// Returns an error for truncated data or invalid field values.
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self>;
}

/// Little-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    /// Starts decoding at the beginning of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read position.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Truncated {
                offset: self.offset,
                needed: n,
                len: self.data.len(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32> {
        self.array().map(i32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64> {
        self.array().map(f64::from_le_bytes)
    }

    fn len_prefix(&mut self) -> Result<usize> {
        let n = self.u32()?;
        usize::try_from(n).map_err(|_| Error::InvalidFormat(format!("length {n} too large")))
    }

    fn index(&mut self) -> Result<usize> {
        let raw = self.u64()?;
        usize::try_from(raw).map_err(|_| Error::InvalidFormat(format!("index {raw} too large")))
    }

    fn optional_index(&mut self) -> Result<Option<usize>> {
        match self.u64()? {
            NO_CLUSTER => Ok(None),
            raw => usize::try_from(raw)
                .map(Some)
                .map_err(|_| Error::InvalidFormat(format!("index {raw} too large"))),
        }
    }

    fn side(&mut self) -> Result<Side> {
        match self.u8()? {
            0 => Ok(Side::Front),
            1 => Ok(Side::Back),
            other => Err(Error::InvalidFormat(format!("side tag {other}"))),
        }
    }

    fn provenance(&mut self) -> Result<Match> {
        let n = self.len_prefix()?;
        let mut provenance = Match::new();
        for _ in 0..n {
            let origin = Origin::new(self.i32()?, self.i32()?, self.i32()?);
            provenance.add_link(origin, self.f64()?);
        }
        Ok(provenance)
    }
}

fn put_len(out: &mut Vec<u8>, n: usize) {
    // Saturates; no record holds 2^32 entries
    let n = u32::try_from(n).unwrap_or(u32::MAX);
    out.extend_from_slice(&n.to_le_bytes());
}

fn put_provenance(out: &mut Vec<u8>, provenance: &Match) {
    put_len(out, provenance.len());
    for link in provenance.links() {
        out.extend_from_slice(&link.origin.file.to_le_bytes());
        out.extend_from_slice(&link.origin.entry.to_le_bytes());
        out.extend_from_slice(&link.origin.index.to_le_bytes());
        out.extend_from_slice(&link.weight.to_le_bytes());
    }
}

fn put_index(out: &mut Vec<u8>, index: Option<usize>) {
    let raw = index.map_or(NO_CLUSTER, |i| i as u64);
    out.extend_from_slice(&raw.to_le_bytes());
}

impl Record for Digi {
    const KIND: RecordKind = RecordKind::Digi;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.address.raw().to_le_bytes());
        out.extend_from_slice(&self.channel.to_le_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.adc.to_le_bytes());
        put_provenance(out, &self.provenance);
    }

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let address = StsAddress::from_raw(decoder.u32()?);
        let channel = decoder.u16()?;
        let time = decoder.u64()?;
        let adc = decoder.u16()?;
        let provenance = decoder.provenance()?;
        Ok(Digi::new(address, channel, time, adc, provenance))
    }
}

impl Record for Cluster {
    const KIND: RecordKind = RecordKind::Cluster;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.address.raw().to_le_bytes());
        out.push(self.side as u8);
        for value in [
            self.charge,
            self.position,
            self.position_error,
            self.time,
            self.time_error,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        put_len(out, self.digis.len());
        for &digi in &self.digis {
            out.extend_from_slice(&(digi as u64).to_le_bytes());
        }
        put_provenance(out, &self.provenance);
    }

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let address = StsAddress::from_raw(decoder.u32()?);
        let side = decoder.side()?;
        let charge = decoder.f64()?;
        let position = decoder.f64()?;
        let position_error = decoder.f64()?;
        let time = decoder.f64()?;
        let time_error = decoder.f64()?;
        let n = decoder.len_prefix()?;
        let mut digis = Vec::with_capacity(n.min(decoder.remaining() / 8));
        for _ in 0..n {
            digis.push(decoder.index()?);
        }
        let provenance = decoder.provenance()?;
        Ok(Cluster {
            address,
            side,
            digis,
            charge,
            position,
            position_error,
            time,
            time_error,
            provenance,
        })
    }
}

impl Record for Hit {
    const KIND: RecordKind = RecordKind::Hit;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.address.raw().to_le_bytes());
        for value in [
            self.x,
            self.y,
            self.covariance.xx,
            self.covariance.yy,
            self.covariance.xy,
            self.time,
            self.time_error,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        put_index(out, self.front_cluster);
        put_index(out, self.back_cluster);
        out.extend_from_slice(&self.du.to_le_bytes());
        out.extend_from_slice(&self.dv.to_le_bytes());
    }

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let address = StsAddress::from_raw(decoder.u32()?);
        let x = decoder.f64()?;
        let y = decoder.f64()?;
        let covariance = Covariance2::new(decoder.f64()?, decoder.f64()?, decoder.f64()?);
        let time = decoder.f64()?;
        let time_error = decoder.f64()?;
        let front_cluster = decoder.optional_index()?;
        let back_cluster = decoder.optional_index()?;
        Ok(Hit {
            address,
            x,
            y,
            covariance,
            time,
            time_error,
            front_cluster,
            back_cluster,
            du: decoder.f64()?,
            dv: decoder.f64()?,
        })
    }
}

/// Encodes a header and all records into one buffer.
#[must_use]
pub fn encode_records<R: Record>(records: &[R]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + 64 * records.len());
    out.extend_from_slice(&FileHeader::new(R::KIND, records.len() as u64).to_bytes());
    for record in records {
        record.encode(&mut out);
    }
    out
}

/// Decodes a complete data file of `R` records.
///
/// # Errors
/// Returns an error if the header is invalid, holds another record kind,
/// the data is truncated or trailing bytes follow the last record.
pub fn decode_records<R: Record>(data: &[u8]) -> Result<Vec<R>> {
    let header = FileHeader::parse(data)?;
    if header.kind != R::KIND {
        return Err(Error::KindMismatch {
            expected: R::KIND.name(),
            found: header.kind.name(),
        });
    }
    let mut decoder = Decoder::new(&data[HEADER_SIZE..]);
    let count = usize::try_from(header.count)
        .map_err(|_| Error::InvalidFormat(format!("record count {}", header.count)))?;
    let mut records = Vec::with_capacity(count.min(decoder.remaining()));
    for _ in 0..count {
        records.push(R::decode(&mut decoder)?);
    }
    if decoder.remaining() > 0 {
        return Err(Error::InvalidFormat(format!(
            "{} trailing bytes after {count} records",
            decoder.remaining()
        )));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_digi() -> Digi {
        let mut provenance = Match::single(Origin::new(1, 2, 3), 12_000.0);
        provenance.add_link(Origin::new(1, 2, 9), 500.0);
        Digi::new(
            StsAddress::module(1, 2, 0, 4).unwrap(),
            1500,
            123_456,
            17,
            provenance,
        )
    }

    #[test]
    fn test_header_layout() {
        let bytes = FileHeader::new(RecordKind::Hit, 5).to_bytes();
        assert_eq!(&bytes[0..4], b"STSD");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), SCHEMA_VERSION);
        assert_eq!(bytes[6], 3);
        assert_eq!(bytes[7], 0);
        assert_eq!(FileHeader::parse(&bytes).unwrap().count, 5);
    }

    #[test]
    fn test_digi_layout() {
        let digi = sample_digi();
        let mut out = Vec::new();
        digi.encode(&mut out);
        // address + channel + time + adc + link count + 2 links
        assert_eq!(out.len(), 4 + 2 + 8 + 2 + 4 + 2 * 20);
        let decoded = Digi::decode(&mut Decoder::new(&out)).unwrap();
        assert_eq!(decoded, digi);
    }

    #[test]
    fn test_cluster_and_hit_records() {
        let module = StsAddress::module(0, 3, 1, 2).unwrap();
        let mut cluster = Cluster::new(module, Side::Back);
        cluster.push(4);
        cluster.push(7);
        cluster.set_properties(3.1e4, 1100.4, 0.21, 87.5, 3.5);
        cluster.provenance = Match::single(Origin::new(0, 1, 2), 3.1e4);
        let decoded: Vec<Cluster> = decode_records(&encode_records(&[cluster.clone()])).unwrap();
        assert_eq!(decoded, vec![cluster]);

        let hit = Hit {
            address: module,
            x: -0.25,
            y: 0.75,
            covariance: Covariance2::new(1e-6, 4e-4, -2e-5),
            time: 88.0,
            time_error: 2.5,
            front_cluster: Some(0),
            back_cluster: None,
            du: 0.001,
            dv: 0.002,
        };
        let decoded: Vec<Hit> = decode_records(&encode_records(&[hit])).unwrap();
        assert_eq!(decoded[0].back_cluster, None);
        assert_eq!(decoded[0].front_cluster, Some(0));
        assert_relative_eq!(decoded[0].covariance.xy, -2e-5);
    }

    #[test]
    fn test_rejects_bad_input() {
        let good = encode_records(&[sample_digi()]);

        let mut bad_version = good.clone();
        bad_version[4] = 9;
        assert!(matches!(
            decode_records::<Digi>(&bad_version),
            Err(Error::UnsupportedVersion(9))
        ));

        let mut bad_kind = good.clone();
        bad_kind[6] = 42;
        assert!(matches!(
            decode_records::<Digi>(&bad_kind),
            Err(Error::UnknownKind(42))
        ));

        assert!(matches!(
            decode_records::<Hit>(&good),
            Err(Error::KindMismatch { .. })
        ));
        assert!(matches!(
            decode_records::<Digi>(&good[..good.len() - 3]),
            Err(Error::Truncated { .. })
        ));
        assert!(matches!(
            decode_records::<Digi>(b"NOPE\x01\x00\x01\x00"),
            Err(Error::BadMagic(_))
        ));

        let mut trailing = good;
        trailing.push(0);
        assert!(decode_records::<Digi>(&trailing).is_err());
    }
}
