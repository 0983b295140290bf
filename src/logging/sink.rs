//! sink.rs
//! Where the log writer puts rows. `CsvSink` for files; tests and benches plug in their own.

use crate::error::LogError;
use csv::Writer;
use std::{
    fs::{File, create_dir_all},
    io::{BufWriter, Write},
    path::Path,
};

pub trait RowSink: Send {
    fn write_header(&mut self, columns: &[String]) -> Result<(), LogError>;

    fn write_row(&mut self, cells: &[String]) -> Result<(), LogError>;

    fn flush(&mut self) -> Result<(), LogError>;
}

/// Comma-separated rows through a buffered writer.
pub struct CsvSink<W: Write + Send> {
    writer: Writer<W>,
}

impl CsvSink<BufWriter<File>> {
    /// Creates (truncates) the file and any missing parent directories.
    pub fn create(path: &Path) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write + Send> CsvSink<W> {
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: Writer::from_writer(inner),
        }
    }
}

impl<W: Write + Send> RowSink for CsvSink<W> {
    fn write_header(&mut self, columns: &[String]) -> Result<(), LogError> {
        self.writer.write_record(columns)?;
        Ok(())
    }

    fn write_row(&mut self, cells: &[String]) -> Result<(), LogError> {
        self.writer.write_record(cells)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }
}
