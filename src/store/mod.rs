//! Line-record stores and gzip file helpers
//!
//! Two persistence surfaces live here. [`JsonlWriter`]/[`JsonlReader`] are the
//! line-record store: append-oriented newline-delimited JSON, plain or gzip,
//! one record per line. The [`gz`] helpers cover whole-file gzip surfaces
//! (station archives, metadata and derived tables) where a run replaces the
//! file in one atomic step.

pub mod gz;
mod jsonl;

pub use jsonl::{JsonlReader, JsonlWriter};

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error during store operations
    #[error("IO error: {0}")]
    Io(String),

    /// Record could not be serialized for writing
    #[error("Failed to serialize record: {0}")]
    Serialize(String),

    /// A stored line did not deserialize as a record
    #[error("Malformed record at {path} line {line}: {message}")]
    MalformedRecord {
        /// Store file the line came from
        path: String,
        /// 1-based line number of the offending line
        line: usize,
        /// Deserializer message
        message: String,
    },

    /// CSV-level error while building or parsing a table
    #[error("CSV error: {0}")]
    Csv(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// On-disk framing of a line-record store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed text, one record per line
    Plain,
    /// Transparent gzip framing; record semantics are byte-identical
    Gzip,
}
