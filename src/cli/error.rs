//! CLI error types and conversions

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::fetcher::FetchError;
use crate::process::ProcessError;
use crate::store::StoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fetch error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Archive error
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Transformer error
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
