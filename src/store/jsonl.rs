//! Newline-delimited JSON record store
//!
//! One serialized record per line, appended in call order. A handle is
//! write-only or read-only for its whole lifetime. Closing is explicit via
//! [`JsonlWriter::finish`] on the success path; on early exit the file handle
//! (and gzip footer) are released by drop.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Compression, StoreError, StoreResult};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Flush interval for record writers (flush every N records)
const FLUSH_INTERVAL: u64 = 1_000;

enum LineSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl LineSink {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            LineSink::Plain(w) => w.write_all(buf),
            LineSink::Gzip(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            LineSink::Plain(w) => w.flush(),
            LineSink::Gzip(w) => w.flush(),
        }
    }
}

/// Write handle for a line-record store
pub struct JsonlWriter<T> {
    sink: LineSink,
    path: PathBuf,
    records_written: u64,
    _record: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    /// Create the store file for writing, truncating any existing file.
    ///
    /// Parent directories are created as needed.
    pub fn create<P: AsRef<Path>>(path: P, compression: Compression) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), ?compression, "Opening line-record store for write");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("Failed to create directory: {e}")))?;
        }

        let file = File::create(path)
            .map_err(|e| StoreError::Io(format!("Failed to create {}: {e}", path.display())))?;
        let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
        let sink = match compression {
            Compression::Plain => LineSink::Plain(buf_writer),
            Compression::Gzip => LineSink::Gzip(GzEncoder::new(buf_writer, GzLevel::default())),
        };

        Ok(Self {
            sink,
            path: path.to_path_buf(),
            records_written: 0,
            _record: PhantomData,
        })
    }

    /// Serialize one record and append it plus a trailing newline.
    ///
    /// Once this returns the record is fully handed to the sink; there are no
    /// partial-record writes at the store boundary.
    pub fn write(&mut self, record: &T) -> StoreResult<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        line.push('\n');

        self.sink
            .write_all(line.as_bytes())
            .map_err(|e| StoreError::Io(format!("Failed to append record: {e}")))?;
        self.records_written += 1;

        if self.records_written % FLUSH_INTERVAL == 0 {
            self.flush()?;
            debug!("Progress: {} records written", self.records_written);
        }

        Ok(())
    }

    /// Number of records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flush buffered data to disk.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.sink
            .flush()
            .map_err(|e| StoreError::Io(format!("Failed to flush: {e}")))
    }

    /// Finish the store: flush, complete the gzip framing, and sync to disk.
    ///
    /// Returns the number of records written.
    pub fn finish(mut self) -> StoreResult<u64> {
        self.flush()?;

        let JsonlWriter {
            sink,
            path,
            records_written,
            ..
        } = self;

        let buf_writer = match sink {
            LineSink::Plain(w) => w,
            LineSink::Gzip(w) => w
                .finish()
                .map_err(|e| StoreError::Io(format!("Failed to finish gzip stream: {e}")))?,
        };
        let file = buf_writer
            .into_inner()
            .map_err(|e| StoreError::Io(format!("Failed to recover file handle: {e}")))?;
        file.sync_all()
            .map_err(|e| StoreError::Io(format!("Failed to sync file: {e}")))?;

        info!(
            path = %path.display(),
            records = records_written,
            "Line-record store closed"
        );
        Ok(records_written)
    }
}

/// Read handle for a line-record store
///
/// Iterates records lazily, one line at a time. A line that fails to
/// deserialize yields [`StoreError::MalformedRecord`] with its line number;
/// iteration can continue past it.
pub struct JsonlReader<T> {
    lines: std::io::Lines<Box<dyn BufRead>>,
    path: PathBuf,
    line_no: usize,
    _record: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// Open an existing store file for reading.
    pub fn open<P: AsRef<Path>>(path: P, compression: Compression) -> StoreResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), ?compression, "Opening line-record store for read");

        let file = File::open(path)
            .map_err(|e| StoreError::Io(format!("Failed to open {}: {e}", path.display())))?;
        let source: Box<dyn BufRead> = match compression {
            Compression::Plain => Box::new(BufReader::new(file)),
            Compression::Gzip => Box::new(BufReader::new(GzDecoder::new(file))),
        };

        Ok(Self {
            lines: source.lines(),
            path: path.to_path_buf(),
            line_no: 0,
            _record: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for JsonlReader<T> {
    type Item = StoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => {
                return Some(Err(StoreError::Io(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                ))))
            }
        };
        self.line_no += 1;

        match serde_json::from_str(&line) {
            Ok(record) => Some(Ok(record)),
            Err(e) => Some(Err(StoreError::MalformedRecord {
                path: self.path.display().to_string(),
                line: self.line_no,
                message: e.to_string(),
            })),
        }
    }
}
