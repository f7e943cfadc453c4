//! Transformers from stored raw data to derived tables
//!
//! These run entirely offline against files the fetchers wrote: bulletin page
//! stores become a hazard rating table, event batches become a typed event
//! table, and the station metadata table drives station selection.

use thiserror::Error;

use crate::store::StoreError;

/// Avalanche event table extraction
pub mod events;

/// Hazard rating extraction from bulletin pages
pub mod hazards;

/// Minimal HTML block and text extraction
pub mod html;

/// Station metadata loading and selection
pub mod stations;

/// Transformer errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Filesystem access failed
    #[error("IO error: {0}")]
    Io(String),

    /// Reading or writing a store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A raw store did not have the expected shape
    #[error("Malformed input: {0}")]
    Input(String),

    /// The station metadata table is missing, ambiguous, or unreadable
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// A selection filter is inconsistent
    #[error("Invalid filter: {0}")]
    Filter(String),
}

/// Result type for transformer operations
pub type ProcessResult<T> = Result<T, ProcessError>;
