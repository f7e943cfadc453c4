//! Whole-file gzip helpers with atomic replacement
//!
//! Station archives and derived tables are replaced wholesale each run: the
//! new content is compressed, written to a temp file in the destination
//! directory, synced, and renamed over the target. A failed write leaves the
//! previous file byte-identical.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::{StoreError, StoreResult};

/// Read an entire gzip file into a string.
pub fn read_gzip_string(path: &Path) -> StoreResult<String> {
    let file = File::open(path)
        .map_err(|e| StoreError::Io(format!("Failed to open {}: {e}", path.display())))?;
    let mut decoder = GzDecoder::new(file);
    let mut content = String::new();
    decoder
        .read_to_string(&mut content)
        .map_err(|e| StoreError::Io(format!("Failed to decompress {}: {e}", path.display())))?;
    Ok(content)
}

/// Open a gzip file as a streaming reader.
pub fn open_gzip(path: &Path) -> StoreResult<GzDecoder<File>> {
    let file = File::open(path)
        .map_err(|e| StoreError::Io(format!("Failed to open {}: {e}", path.display())))?;
    Ok(GzDecoder::new(file))
}

/// Compress `content` and atomically replace the file at `path` with it.
///
/// The temp file lives in the destination directory so the final rename never
/// crosses filesystems. The rename is made durable with a parent-directory
/// sync.
pub fn write_gzip_atomic(path: &Path, content: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Io(format!("Failed to create directory: {e}")))?;
    }

    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder
        .write_all(content)
        .map_err(|e| StoreError::Io(format!("Failed to compress content: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| StoreError::Io(format!("Failed to finish gzip stream: {e}")))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| StoreError::Io(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(&compressed)
        .map_err(|e| StoreError::Io(format!("Failed to write temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| StoreError::Io(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::Io(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| StoreError::Io(format!("Failed to persist {}: {e}", path.display())))?;

    // Fsync parent directory so the rename survives a crash
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    debug!(
        path = %path.display(),
        raw_bytes = content.len(),
        compressed_bytes = compressed.len(),
        "Replaced gzip file"
    );
    Ok(())
}

/// Serialize `rows` as CSV (headers from the record type) and atomically
/// replace `path` with the gzip-compressed table.
pub fn write_csv_gzip_atomic<T: Serialize>(path: &Path, rows: &[T]) -> StoreResult<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| StoreError::Csv(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Csv(e.to_string()))?;
    write_gzip_atomic(path, &bytes)
}

/// Write an explicit header row plus string rows as gzip CSV, atomically.
pub fn write_csv_rows_gzip_atomic(
    path: &Path,
    header: &[&str],
    rows: &[Vec<String>],
) -> StoreResult<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|e| StoreError::Csv(e.to_string()))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| StoreError::Csv(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Csv(e.to_string()))?;
    write_gzip_atomic(path, &bytes)
}
