//! File writers for digis, clusters and hits.

use crate::codec::{FileHeader, Record};
use crate::Result;
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use stripsim_core::{Cluster, Digi, Hit};

/// Buffered writer for one output file.
///
/// A file holds either one binary block of records or one CSV table.
pub struct DataFileWriter {
    writer: BufWriter<File>,
}

impl DataFileWriter {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes a header and the records in the binary schema.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_records<R: Record>(&mut self, records: &[R]) -> Result<()> {
        let header = FileHeader::new(R::KIND, records.len() as u64);
        self.writer.write_all(&header.to_bytes())?;
        let mut buffer = Vec::with_capacity(256);
        for record in records {
            buffer.clear();
            record.encode(&mut buffer);
            self.writer.write_all(&buffer)?;
        }
        debug!("wrote {} {} records", records.len(), R::KIND.name());
        self.writer.flush()?;
        Ok(())
    }

    /// Writes digis as CSV.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_digis_csv(&mut self, digis: &[Digi]) -> Result<()> {
        writeln!(self.writer, "address,channel,time,adc,nof_links")?;
        for d in digis {
            writeln!(
                self.writer,
                "{:#010x},{},{},{},{}",
                d.address.raw(),
                d.channel,
                d.time,
                d.adc,
                d.provenance.len()
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes clusters as CSV.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_clusters_csv(&mut self, clusters: &[Cluster]) -> Result<()> {
        writeln!(
            self.writer,
            "address,side,size,charge,position,position_error,time,time_error"
        )?;
        for c in clusters {
            writeln!(
                self.writer,
                "{:#010x},{},{},{},{},{},{},{}",
                c.address.raw(),
                c.side.index(),
                c.size(),
                c.charge,
                c.position,
                c.position_error,
                c.time,
                c.time_error
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes hits as CSV. Missing cluster references are left empty.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_hits_csv(&mut self, hits: &[Hit]) -> Result<()> {
        writeln!(
            self.writer,
            "address,x,y,var_x,var_y,cov_xy,time,time_error,front_cluster,back_cluster,du,dv"
        )?;
        let index = |i: Option<usize>| i.map(|i| i.to_string()).unwrap_or_default();
        for h in hits {
            writeln!(
                self.writer,
                "{:#010x},{},{},{},{},{},{},{},{},{},{},{}",
                h.address.raw(),
                h.x,
                h.y,
                h.covariance.xx,
                h.covariance.yy,
                h.covariance.xy,
                h.time,
                h.time_error,
                index(h.front_cluster),
                index(h.back_cluster),
                h.du,
                h.dv
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
